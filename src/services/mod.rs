pub mod assembler;
pub mod knowledge_base;
pub mod prompts;
pub mod section_generator;

pub use assembler::DocumentAssembler;
pub use knowledge_base::{KnowledgeCorpus, RetrievalProvider, TextSplitter};
pub use section_generator::{DiagramWarning, GeneratedSection, SectionGenerator};
