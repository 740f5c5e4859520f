//! 提案模板解析
//!
//! 只有二级标题（`## `）划分章节，第一个二级标题之前的内容（一级标题、引言等）不属于任何章节。

use serde::{Deserialize, Serialize};

use crate::models::section::Section;

/// 章节标题前缀
const SECTION_HEADING_PREFIX: &str = "## ";

/// 默认提案模板
pub const DEFAULT_PROPOSAL_TEMPLATE: &str = r#"
# 提案

## 引言
[提供提交本提案的组织或团队的概述，包括相关经验和能力。]

## 项目范围和目标
[清晰地定义问题陈述或机会，然后是项目的目标和预期成果。]

## 提议的解决方案和方法
[描述为实现目标而提议的方法、策略或解决方案。包括将使用的任何方法论、框架或工具。]

## 工作流程概述
[列出工作流程概述。]

## 职责和客户投入
[概述客户方需要提供的内容——数据、访问权限、审批、反馈等。]

## 时间表和里程碑
[提供详细的时间表，包括关键阶段、可交付成果和预期完成日期。]

## 成本结构和付款条件
[总结财务方面，如定价模型、成本估算和付款时间表。]

# 关于团队/组织
[简要介绍提案实体，重点介绍相关项目、优势或领域专业知识。]
"#;

/// 按模板顺序排列的章节列表
///
/// 模板只会整体替换，不会原地修改
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    sections: Vec<Section>,
}

impl Template {
    /// 解析模板文本
    ///
    /// 逐行扫描，以 `## ` 开头的行开启新章节，其后各行（含标题行本身）原样追加到该章节，
    /// 每行以换行结尾，直到下一个二级标题或文本结束。标题去掉首尾空白后为空的 `## ` 行
    /// 视为普通正文。
    ///
    /// 没有二级标题的模板得到空列表，调用方应视为"无可生成内容"而不是错误。
    pub fn parse(text: &str) -> Self {
        let mut sections = Vec::new();
        let mut current: Option<Section> = None;

        for line in text.trim().lines() {
            if let Some(title) = heading_title(line) {
                sections.extend(current.take());
                current = Some(Section {
                    title: title.to_string(),
                    raw_content: format!("{line}\n"),
                });
            } else if let Some(section) = current.as_mut() {
                section.raw_content.push_str(line);
                section.raw_content.push('\n');
            }
        }
        sections.extend(current);

        Self { sections }
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Section> {
        self.sections.get(index)
    }
}

/// 若该行是二级标题则返回去掉空白后的标题
fn heading_title(line: &str) -> Option<&str> {
    line.strip_prefix(SECTION_HEADING_PREFIX)
        .map(str::trim)
        .filter(|title| !title.is_empty())
}
