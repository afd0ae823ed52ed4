pub mod pnl;
