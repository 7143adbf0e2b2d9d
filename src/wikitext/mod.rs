pub mod args;
pub mod locate;

pub use args::{parse, ParsedArguments, TemplateArguments, TemplateArgumentsBuilder};
pub use locate::{locate, Located};
