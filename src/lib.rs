pub mod app;
pub mod bg3;
pub mod config;
pub mod detect;
pub mod logging;
pub mod lsx;
pub mod modlist;
pub mod prompt;
pub mod reconcile;
