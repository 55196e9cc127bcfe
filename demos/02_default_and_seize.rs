/// default and seize - the lender takes the collateral after the deadline passes
use nft_loan_ledger::{
    Address, BidRequest, InMemoryCustody, LedgerConfig, LedgerError, LoanLedger, LoanTerms, Money,
    Rate, SafeTimeProvider, TimeSource,
};
use chrono::{Duration, TimeZone, Utc};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== default and seize ===\n");

    let time = SafeTimeProvider::new(TimeSource::Test(
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    ));
    let controller = time.test_control().unwrap();

    let borrower = Address::repeat_byte(0xb1);
    let lender = Address::repeat_byte(0xa1);
    let collection = Address::repeat_byte(0x77);

    let config = LedgerConfig::testnet();
    let mut custody = InMemoryCustody::new(config.ledger_address);
    custody.mint_asset(collection, 1, borrower);
    custody.fund(lender, Money::from_major(3));
    let mut ledger = LoanLedger::new(config, custody)?;

    let loan_id = ledger.create_loan(
        borrower,
        LoanTerms {
            collateral_asset: collection,
            collateral_id: 1,
            interest_rate: Rate::from_bps(1500),
            max_loan_amount: Money::from_major(2),
            loan_complete_time: time.now() + Duration::days(14),
        },
        &time,
    )?;
    ledger.underwrite(
        loan_id,
        BidRequest { bidder: lender, bid_amount: Money::from_major(2), deposit: Money::from_major(2) },
        &time,
    )?;
    ledger.draw_loan(loan_id, &borrower, &time)?;
    println!("status: {:?}", ledger.status(loan_id, &time)?);

    // seizing early is refused
    match ledger.seize_collateral(loan_id, &lender, &time) {
        Err(LedgerError::NotExpired { deadline, .. }) => println!("cannot seize before {}", deadline),
        other => println!("unexpected: {:?}", other),
    }

    controller.advance(Duration::days(15));
    println!("\nadvanced to {}", time.now().format("%Y-%m-%d"));
    println!("status: {:?}", ledger.status(loan_id, &time)?);

    let actions = ledger.available_actions(loan_id, &borrower, &time)?;
    println!("repay: {:?}", actions.repay);
    println!("seize: {:?}", actions.seize);

    let receipt = ledger.seize_collateral(loan_id, &lender, &time)?;
    println!("\n{} seized the collateral against {} ETH", receipt.lender, receipt.principal.to_ether());
    println!("collateral now owned by {:?}", ledger.custody().owner_of(&collection, 1));
    println!("status: {:?}", ledger.status(loan_id, &time)?);

    Ok(())
}
