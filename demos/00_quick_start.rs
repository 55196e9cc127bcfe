/// quick start - list an nft, take one bid, draw and repay
use nft_loan_ledger::{
    Address, BidRequest, InMemoryCustody, LedgerConfig, LoanLedger, LoanTerms, LoanView, Money,
    Rate, SafeTimeProvider, TimeSource,
};
use chrono::{Duration, TimeZone, Utc};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let time = SafeTimeProvider::new(TimeSource::Test(
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    ));
    let controller = time.test_control().unwrap();

    let borrower: Address = "0xb1b1b1b1b1b1b1b1b1b1b1b1b1b1b1b1b1b1b1b1".parse()?;
    let lender: Address = "0xa1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1".parse()?;
    let punks: Address = "0x7777777777777777777777777777777777777777".parse()?;

    let config = LedgerConfig::default();
    let mut custody = InMemoryCustody::new(config.ledger_address);
    custody.mint_asset(punks, 42, borrower);
    custody.fund(lender, Money::from_major(5));
    custody.fund(borrower, Money::from_major(1));

    let mut ledger = LoanLedger::new(config, custody)?;

    // list punk #42 for up to 2 ETH at 10% a year, due in 30 days
    let loan_id = ledger.create_loan(
        borrower,
        LoanTerms {
            collateral_asset: punks,
            collateral_id: 42,
            interest_rate: Rate::from_percentage(10),
            max_loan_amount: Money::from_major(2),
            loan_complete_time: time.now() + Duration::days(30),
        },
        &time,
    )?;

    // underwrite and draw
    let bid = Money::from_ether("1.5")?;
    ledger.underwrite(loan_id, BidRequest { bidder: lender, bid_amount: bid, deposit: bid }, &time)?;
    let drawn = ledger.draw_loan(loan_id, &borrower, &time)?;
    println!("borrower drew {} ETH", drawn.amount.to_ether());

    // repay two weeks later
    controller.advance(Duration::days(14));
    let quote = ledger.quote_required_repayment(loan_id, &time)?;
    let receipt = ledger.repay_loan(loan_id, &borrower, quote, &time)?;
    println!("repaid {} ETH ({} ETH interest)", receipt.required.to_ether(), receipt.interest.to_ether());

    println!("{}", LoanView::from_loan(loan_id, ledger.get_loan(loan_id)?, time.now()).to_json_pretty()?);

    Ok(())
}
