use dialoguer::{Confirm, Input};

use crate::error::Result;
use crate::normalize::{BillFields, parse_amount};

/// The fields as typed. A cleared text field stays empty.
fn edited_fields(
    invoice_number: &str,
    company_name: &str,
    amount: &str,
    bill_date: &str,
) -> Result<BillFields> {
    Ok(BillFields {
        invoice_number: invoice_number.trim().to_string(),
        company_name: company_name.trim().to_string(),
        total_cost: parse_amount(amount)?,
        bill_date: bill_date.trim().to_string(),
    })
}

/// Let the user correct the proposed fields, then ask whether to save.
/// Returns `None` when the user declines.
pub fn review(proposal: BillFields) -> Result<Option<BillFields>> {
    println!("{}", "\u{2500}".repeat(60));
    println!("  Invoice number: {}", proposal.invoice_number);
    println!("  Company:        {}", proposal.company_name);
    println!("  Total cost:     {}", proposal.total_cost);
    println!("  Bill date:      {}", proposal.bill_date);
    println!();

    let invoice_number: String = Input::new()
        .with_prompt("Invoice number")
        .with_initial_text(proposal.invoice_number)
        .allow_empty(true)
        .interact_text()?;

    let company_name: String = Input::new()
        .with_prompt("Company name")
        .with_initial_text(proposal.company_name)
        .allow_empty(true)
        .interact_text()?;

    // An unreadable amount re-prompts instead of being saved as zero
    let amount: String = Input::new()
        .with_prompt("Total cost")
        .with_initial_text(proposal.total_cost.to_string())
        .validate_with(|input: &String| parse_amount(input).map(|_| ()).map_err(|e| e.to_string()))
        .interact_text()?;

    let bill_date: String = Input::new()
        .with_prompt("Bill date")
        .with_initial_text(proposal.bill_date)
        .allow_empty(true)
        .interact_text()?;

    let fields = edited_fields(&invoice_number, &company_name, &amount, &bill_date)?;

    let save = Confirm::new()
        .with_prompt("Save this bill?")
        .default(true)
        .interact()?;

    Ok(save.then_some(fields))
}
