use market_sync_lib::config::Config;
use market_sync_lib::core::chunking::DateRange;
use market_sync_lib::db;
use market_sync_lib::models::PriceRow;

fn print_rows(title: &str, rows: &[PriceRow]) {
    println!("\n{}", title);
    println!("{:<28} | {:<6} | {:>10}", "Date", "Hour", "Price");
    println!("{}", "-".repeat(50));
    for row in rows {
        println!("{:<28} | {:<6} | {:>10.2}", row.date, row.hour, row.price);
    }
}

/// Usage: check_data [FROM TO]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    let args: Vec<String> = std::env::args().skip(1).collect();

    println!("🔍 Database: {}", config.database_path.display());
    let pool = db::open(&config.database_path).await?;

    let counts = db::all_counts(&pool).await?;
    println!("\nMCP records:         {}", counts.mcp);
    println!("Generation records:  {}", counts.generation);
    println!("Consumption records: {}", counts.consumption);

    let range = match (args.first(), args.get(1)) {
        (Some(from), Some(to)) => DateRange::parse(from, to)?,
        _ => match db::latest_date(&pool, market_sync_lib::models::Dataset::Price).await? {
            Some(last) => DateRange::single(last),
            None => {
                println!("\nNo price data stored.");
                return Ok(());
            }
        },
    };

    let rows = db::get_prices(&pool, range).await?;
    println!("\nPrices in {}: {}", range, rows.len());

    print_rows("First 5:", &rows[..rows.len().min(5)]);
    if rows.len() > 5 {
        print_rows("Last 5:", &rows[rows.len().saturating_sub(5)..]);
    }

    println!("\nDone.");
    Ok(())
}
