pub mod account;
pub mod calendar;
pub mod history;
pub mod instrument;
pub mod order;
pub mod plan;
pub mod position;
