pub mod render;
pub mod theme;

pub use render::{
    render_consistency_issues, render_error, render_prompts, render_report, render_rewrite,
    render_settings, render_summary,
};
pub use theme::{Painter, Theme};
