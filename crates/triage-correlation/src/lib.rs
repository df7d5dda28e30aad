pub mod correlator;
pub mod pipeline;
pub mod render;

pub use correlator::correlate;
pub use pipeline::TriagePipeline;
pub use render::{escape_html, render_failures, render_html_table, render_text_table};
