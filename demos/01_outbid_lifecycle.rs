/// outbid lifecycle - lenders compete for a loan and get paid out with interest
use nft_loan_ledger::{
    Address, BidRequest, Event, InMemoryCustody, LedgerConfig, LedgerView, LoanLedger, LoanTerms,
    Money, Rate, SafeTimeProvider, TimeSource,
};
use chrono::{Duration, TimeZone, Utc};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== outbid lifecycle ===\n");

    let time = SafeTimeProvider::new(TimeSource::Test(
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    ));
    let controller = time.test_control().unwrap();

    let borrower = Address::repeat_byte(0xb1);
    let lenders = [Address::repeat_byte(0xa1), Address::repeat_byte(0xa2), Address::repeat_byte(0xa3)];
    let collection = Address::repeat_byte(0x77);

    let config = LedgerConfig::default();
    let mut custody = InMemoryCustody::new(config.ledger_address);
    custody.mint_asset(collection, 7, borrower);
    for lender in lenders {
        custody.fund(lender, Money::from_major(10));
    }
    custody.fund(borrower, Money::from_major(1));
    let mut ledger = LoanLedger::new(config, custody)?;

    let loan_id = ledger.create_loan(
        borrower,
        LoanTerms {
            collateral_asset: collection,
            collateral_id: 7,
            interest_rate: Rate::from_percentage(20),
            max_loan_amount: Money::from_major(5),
            loan_complete_time: time.now() + Duration::days(60),
        },
        &time,
    )?;
    println!("loan {} listed on {}", loan_id, time.now().format("%Y-%m-%d"));

    // each lender tops the previous bid a few days apart
    for (round, (lender, amount)) in lenders.iter().zip(["1", "2.5", "4"]).enumerate() {
        if round > 0 {
            controller.advance(Duration::days(5));
        }
        let bid_amount = Money::from_ether(amount)?;
        let quote = ledger.quote_underwrite(loan_id, bid_amount, &time)?;
        let receipt = ledger.underwrite(
            loan_id,
            BidRequest { bidder: *lender, bid_amount, deposit: quote.deposit },
            &time,
        )?;
        println!(
            "{}: {} bids {} ETH, deposit {} ETH, change {} wei",
            time.now().format("%Y-%m-%d"),
            lender,
            bid_amount.to_ether(),
            quote.deposit.to_ether(),
            receipt.change.as_decimal(),
        );
        if let Some(displaced) = receipt.displaced {
            println!(
                "  {} refunded {} ETH + {} ETH interest",
                displaced.lender,
                displaced.principal.to_ether(),
                displaced.interest.to_ether()
            );
        }
    }

    let drawn = ledger.draw_loan(loan_id, &borrower, &time)?;
    println!("\nborrower drew {} ETH", drawn.amount.to_ether());

    controller.advance(Duration::days(10));
    let interest = ledger.calculate_total_interest(loan_id, time.now())?;
    println!("interest owed after 10 more days: {} ETH", interest.to_ether());

    let required = ledger.quote_required_repayment(loan_id, &time)?;
    let receipt = ledger.repay_loan(loan_id, &borrower, required, &time)?;
    println!("repaid {} ETH, {} wei returned as change", receipt.required.to_ether(), receipt.change.as_decimal());

    println!("\nevents:");
    for event in ledger.events.for_loan(loan_id) {
        let label = match event {
            Event::LoanCreated { .. } => "created",
            Event::LoanCancelled { .. } => "cancelled",
            Event::LoanUnderwritten { .. } => "underwritten",
            Event::LoanDrawn { .. } => "drawn",
            Event::LoanRepaid { .. } => "repaid",
            Event::CollateralSeized { .. } => "seized",
        };
        println!("  {}", label);
    }

    println!("\n{}", LedgerView::all(&ledger, time.now()).to_json_pretty()?);

    Ok(())
}
