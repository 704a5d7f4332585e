// Categorizer: hybrid keyword + embedding categorization of survey answers.
//
// This is the library root. Each module corresponds to one stage of the
// categorization engine, leaf to root.

pub mod normalize;
pub mod taxonomy;
pub mod variants;
pub mod keywords;
pub mod semantic;
pub mod cache;
pub mod pipeline;
pub mod config;
pub mod output;
