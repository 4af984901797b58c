use anyhow::Context;
use clap::{Parser, ValueEnum};
use std::sync::Arc;
use stockpipe_core::collector::Collector;
use stockpipe_core::domain::stock::Basket;
use stockpipe_core::pipeline::Pipeline;
use stockpipe_core::storage::memory::MemoryStockStore;
use stockpipe_core::storage::stocks::PgStockStore;
use stockpipe_core::storage::StockStore;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum BasketArg {
    Samsung,
    Snp,
}

impl From<BasketArg> for Basket {
    fn from(arg: BasketArg) -> Self {
        match arg {
            BasketArg::Samsung => Basket::Samsung,
            BasketArg::Snp => Basket::Snp,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "stockpipe_worker")]
struct Args {
    /// Collect a fixed basket; stops at the first failing symbol.
    #[arg(long, value_enum)]
    basket: Option<BasketArg>,

    /// Collect these symbols in order. Save failures are logged and skipped.
    #[arg(long = "symbol")]
    symbols: Vec<String>,

    /// Print news search results for this query as JSON.
    #[arg(long)]
    news: Option<String>,

    /// Keep collected rows in memory instead of writing to the database.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = stockpipe_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();
    anyhow::ensure!(
        args.basket.is_some() || !args.symbols.is_empty() || args.news.is_some(),
        "nothing to do: pass --basket, --symbol or --news"
    );

    let store: Arc<dyn StockStore> = if args.dry_run {
        Arc::new(MemoryStockStore::new())
    } else {
        let db_url = settings.require_database_url()?;
        let store = PgStockStore::connect(db_url, settings.db_max_connections)
            .await
            .context("connect DATABASE_URL failed")?;
        store.migrate().await?;
        Arc::new(store)
    };

    let pipeline = Pipeline::new(Collector::from_env()?, store.clone());
    let result = run(&pipeline, &args).await;

    if let Err(err) = &result {
        sentry_anyhow::capture_anyhow(err);
        tracing::error!(error = %err, "collection run failed");
    }

    store.close().await;
    result
}

async fn run(pipeline: &Pipeline, args: &Args) -> anyhow::Result<()> {
    if let Some(basket) = args.basket {
        let basket = Basket::from(basket);
        let saved = pipeline.collect_basket(basket).await?;
        tracing::info!(
            basket = basket.label(),
            saved = saved.len(),
            dry_run = args.dry_run,
            "basket run finished"
        );
    }

    if !args.symbols.is_empty() {
        let fetched = pipeline
            .collector()
            .fetch_batch(args.symbols.as_slice(), pipeline.store())
            .await?;
        for record in fetched.values() {
            tracing::info!(
                symbol = %record.symbol,
                name = %record.name,
                price = record.price,
                dry_run = args.dry_run,
                "symbol collected"
            );
        }
    }

    if let Some(query) = args.news.as_deref() {
        let items = pipeline.news(query).await?;
        println!("{}", serde_json::to_string_pretty(&items)?);
    }

    Ok(())
}

fn init_sentry(settings: &stockpipe_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
