pub mod backtest_engine;
pub mod conditions;
pub mod daily_selection;
pub mod eastmoney;
pub mod event_log;
pub mod gateway;
pub mod result_writer;
pub mod screener;
pub mod snapshot_gateway;
