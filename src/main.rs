use clap::{Parser, Subcommand};

use app_lib::commands::backtest_cmd::{run_backtest, BacktestArgs};
use app_lib::commands::calendar_cmd::{run_calendar, CalendarArgs};
use app_lib::commands::screen_cmd::{run_screen, ScreenArgs};
use app_lib::utils::logging::init_logging;

#[derive(Parser)]
#[command(name = "ashare-screener")]
#[command(about = "A股每日选股与区间回溯", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 区间回溯选股，结果写入 CSV
    Backtest(BacktestArgs),
    /// 单只股票在某日的筛选结论
    Screen(ScreenArgs),
    /// 列出区间内的交易日
    Calendar(CalendarArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let cli = Cli::parse();

    match cli.cmd {
        Commands::Backtest(args) => {
            let (result, written) = run_backtest(args).await?;
            match written {
                Some(path) => println!("选股结果: {} 个交易日，已写入 {}", result.len(), path.display()),
                None => println!("选股结果: {} 个交易日，无入选股票", result.len()),
            }
        }
        Commands::Screen(args) => {
            run_screen(args).await?;
        }
        Commands::Calendar(args) => {
            run_calendar(args).await?;
        }
    }
    Ok(())
}
