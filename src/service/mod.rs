pub mod app_state;
pub mod context;
pub mod interpret;
pub mod llm;
pub mod prompt;
pub mod sql_guard;
pub mod translate;
