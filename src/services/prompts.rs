//! 提示词模板
//!
//! 两个固定格式的提示词，占位符在调用时替换

/// 流程图提示词，占位符: `{requirements}`
pub const WORKFLOW_PROMPT: &str = r#"
You are a project workflow specialist. Based on the project requirements below, create a custom project workflow diagram using mermaid syntax.

# PROJECT REQUIREMENTS:
{requirements}

Instructions:
1. Analyze the project requirements carefully
2. Create a detailed, logical workflow that would be appropriate for executing this specific project
3. Include key phases, deliverables, and dependencies
4. Use appropriate node shapes and connections
5. The workflow should be specific to this project, not generic
6. Use TD (top-down) orientation
7. Name each node with a letter and short descriptive text (e.g., A[Requirement Analysis])
8. Return ONLY valid mermaid graph syntax for a workflow diagram, nothing else
9. Use this format:

graph TD
    A[First Step] --> B[Second Step]
    B --> C[Third Step]
    ...etc

The workflow must be specifically tailored to the requirements provided and reflect a realistic project execution approach.
"#;

/// 章节正文提示词
///
/// 占位符: `{section_title}` `{body_placeholder}` `{requirements}` `{context}`
pub const SECTION_PROMPT: &str = r###"
You are tasked with generating the body content for a specific section of a document.

# SECTION TITLE
{section_title}

# CONTENT TO GENERATE (replace the placeholder text below)
{body_placeholder}

# DOCUMENT REQUIREMENTS
{requirements}

# RELEVANT CONTEXT
{context}

Instructions:
1. Generate ONLY the body content for the section titled "{section_title}".
2. DO NOT include the section header (e.g., "## {section_title}") in your output.
3. Replace the placeholder text with concrete, specific content.
4. Maintain a formal and professional tone.

IMPORTANT: Generate ONLY the body content for the section.
"###;

/// 生成流程图提示词
pub fn workflow_prompt(requirements: &str) -> String {
    render(WORKFLOW_PROMPT, &[("requirements", requirements)])
}

/// 生成章节正文提示词
pub fn section_prompt(
    section_title: &str,
    body_placeholder: &str,
    requirements: &str,
    context: &str,
) -> String {
    render(
        SECTION_PROMPT,
        &[
            ("section_title", section_title),
            ("body_placeholder", body_placeholder),
            ("requirements", requirements),
            ("context", context),
        ],
    )
}

/// 单次扫描替换 `{name}` 占位符
///
/// 替换进来的值不会再被扫描，所以需求文本里出现 `{context}` 之类的字样也不会被二次替换
fn render(template: &str, values: &[(&str, &str)]) -> String {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        output.push_str(&rest[..start]);
        let after = &rest[start + 1..];

        let replaced = after.find('}').and_then(|end| {
            let name = &after[..end];
            values
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (end, *value))
        });

        match replaced {
            Some((end, value)) => {
                output.push_str(value);
                rest = &after[end + 1..];
            }
            None => {
                output.push('{');
                rest = after;
            }
        }
    }
    output.push_str(rest);
    output
}
