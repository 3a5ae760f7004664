mod command;
mod connection;
mod driver;
mod events;
mod reader;
mod script;

pub use command::*;
pub use connection::*;
pub use driver::*;
pub use events::*;
pub use reader::*;
pub use script::*;

use log::LevelFilter;
use std::env;

pub fn init_logs() {
    let mut logger = env_logger::builder();
    logger
        .is_test(true)
        .format_file(true)
        .format_line_number(true);
    if env::var("RUST_LOG").is_err() {
        logger.filter_level(LevelFilter::Warn);
    }
    let _ = logger.try_init();
}
