pub mod archive;
pub mod attempt;
pub mod board;
pub mod cli;
pub mod config;
pub mod oracle;
pub mod report;
pub mod scanner;
pub mod tracker;
pub mod training;
pub mod util;
