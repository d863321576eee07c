pub mod constants;
pub mod error;
pub mod time_axis;
pub mod record;
pub mod reference;
pub mod cluster;
pub mod evtime;
pub mod matcher;
pub mod selection;
pub mod input;
pub mod pipeline;
pub mod output;
pub mod simulate;
pub mod runner;
pub mod config;
