use std::io::{self, Write};

use color_eyre::eyre;
use structopt::StructOpt;
use tracing::info;

use dca::config::{DcaConfig, ExchangeCredentials};
use dca::factory::{build_services, Services};
use dca::logger;

// lib.rs에서 자동으로 dotenv가 로드됨

#[derive(Debug, StructOpt)]
#[structopt(name = "dca", about = "거래소 정기 비트코인 매수/출금 도구")]
enum Command {
    /// 거래소 지갑 잔고 조회
    Balance,
    /// 법정화폐 금액만큼 시장가 매수
    Buy {
        /// 매수 금액 (법정화폐 정수 단위)
        amount: u64,
        /// 이 매수를 귀속시킬 태그
        #[structopt(long)]
        tag: Option<String>,
        /// 확인 질문 없이 진행 (무인 실행)
        #[structopt(long)]
        yes: bool,
    },
    /// 설정된 주소로 BTC 출금
    Withdraw {
        /// 출금할 사토시. --all과 함께 쓰지 않는다.
        amount: Option<i64>,
        /// 사용 가능한 잔고 전부 출금
        #[structopt(long)]
        all: bool,
        /// 태그 잔고로 출금량 제한
        #[structopt(long)]
        tag: Option<String>,
        /// 확인 질문 없이 진행 (무인 실행)
        #[structopt(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;

    let _guards = logger::init_tracing();

    let config = DcaConfig::from_env();
    let credentials = ExchangeCredentials::from_env();
    let services = build_services(&config, &credentials);

    match Command::from_args() {
        Command::Balance => run_balance(&services).await,
        Command::Buy { amount, tag, yes } => run_buy(&services, &config, amount, tag, yes).await,
        Command::Withdraw { amount, all, tag, yes } => {
            run_withdraw(&services, amount, all, tag, yes).await
        }
    }
}

async fn run_balance(services: &Services) -> eyre::Result<()> {
    let balances = services.balance.get_balances().await?;

    println!("{:<10} {:<24} {:<24}", "asset", "total", "available");
    for row in balances {
        println!("{:<10} {:<24} {:<24}", row.symbol, row.total, row.available);
    }

    Ok(())
}

async fn run_buy(
    services: &Services,
    config: &DcaConfig,
    amount: u64,
    tag: Option<String>,
    yes: bool,
) -> eyre::Result<()> {
    if !yes
        && !confirm(&format!(
            "buy {} {} worth of BTC on {}?",
            amount, config.base_currency, config.exchange
        ))?
    {
        info!("buy aborted by user");
        return Ok(());
    }

    let order = services.buy.buy(amount, tag.as_deref()).await?;

    println!("bought:        {}", order.display_amount_bought);
    println!("spent:         {}", order.display_amount_spent);
    println!("average price: {}", order.display_average_price);
    println!("fees:          {}", order.display_fees_spent);

    Ok(())
}

async fn run_withdraw(
    services: &Services,
    amount: Option<i64>,
    all: bool,
    tag: Option<String>,
    yes: bool,
) -> eyre::Result<()> {
    let balance_to_withdraw = match (all, amount) {
        (true, None) => services.withdraw.get_balance(tag.as_deref()).await?,
        (false, Some(amount)) => amount,
        _ => return Err(eyre::eyre!("specify either an amount or --all")),
    };

    if balance_to_withdraw <= 0 {
        info!("no balance available, skipping withdraw");
        return Ok(());
    }

    let address = services.withdraw.get_recipient_address()?;
    let fee = services.withdraw.get_withdraw_fee_in_satoshis().await?;

    if !yes
        && !confirm(&format!(
            "withdraw {} satoshis to {} (fee {} satoshis)?",
            balance_to_withdraw, address, fee
        ))?
    {
        info!("withdraw aborted by user");
        return Ok(());
    }

    let completed = services
        .withdraw
        .withdraw(balance_to_withdraw, &address, tag.as_deref())
        .await?;

    println!("withdraw id:   {}", completed.id);
    println!("sent:          {} satoshis", completed.net_amount);
    println!("recipient:     {}", completed.recipient_address);

    Ok(())
}

fn confirm(question: &str) -> io::Result<bool> {
    print!("{} [y/N] ", question);
    io::stdout().flush()?;

    let mut answer = String::new();
    io::stdin().read_line(&mut answer)?;
    let answer = answer.trim().to_ascii_lowercase();

    Ok(answer == "y" || answer == "yes")
}
