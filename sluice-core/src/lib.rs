mod abnormal_close;
mod as_value;
mod cancel_command;
mod config;
mod database;
mod delayed_action;
mod driver;
mod error;
mod executor;
mod linked_cancellation;
mod projection;
mod query;
mod registration;
mod row;
mod util;
mod value;

pub use ::anyhow::Context;
pub use ::tokio_util::sync::CancellationToken;
pub use abnormal_close::*;
pub use as_value::*;
pub use cancel_command::*;
pub use config::*;
pub use database::*;
pub use delayed_action::*;
pub use driver::*;
pub use error::*;
pub use linked_cancellation::*;
pub use projection::*;
pub use query::*;
pub use registration::*;
pub use row::*;
pub use util::*;
pub use value::*;
pub use ::futures::future;

pub type Result<T> = anyhow::Result<T>;
pub type Error = anyhow::Error;
