pub mod execute;
pub mod health;
pub mod run_js;
