pub mod template_loader;

pub use template_loader::{load_template_file, LoadedTemplate};
