pub mod loaders;
pub mod section;
pub mod template;

pub use loaders::{load_template_file, LoadedTemplate};
pub use section::{Section, SectionClassifier, SectionKind};
pub use template::{Template, DEFAULT_PROPOSAL_TEMPLATE};
