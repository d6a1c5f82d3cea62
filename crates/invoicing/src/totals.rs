//! Invoice totals arithmetic.

use serde::{Deserialize, Serialize};

use garagekit_core::{DomainResult, Money};
use garagekit_jobcards::PartLine;

/// The three figures every rendered invoice shows.
///
/// `grand_total` equals `sub_total` today; the field exists so tax or
/// discount lines can slot in without changing the document contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceTotals {
    pub parts_total: Money,
    pub sub_total: Money,
    pub grand_total: Money,
}

impl InvoiceTotals {
    /// Compute totals from the frozen snapshot lines and service charge.
    pub fn compute(service_charge: Money, lines: &[PartLine]) -> DomainResult<Self> {
        let mut parts_total = Money::ZERO;
        for line in lines {
            parts_total = parts_total.checked_add(line.line_total()?)?;
        }
        let sub_total = parts_total.checked_add(service_charge)?;
        Ok(Self {
            parts_total,
            sub_total,
            grand_total: sub_total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use garagekit_core::AggregateId;
    use garagekit_inventory::SparePartId;
    use proptest::prelude::*;

    fn line(quantity: i64, unit_price_minor: i64) -> PartLine {
        PartLine {
            part_id: SparePartId::new(AggregateId::new()),
            part_number: "BRK-01".to_string(),
            name: "Brake Pads".to_string(),
            quantity,
            unit_price: Money::from_minor(unit_price_minor),
        }
    }

    #[test]
    fn totals_are_parts_plus_service_charge() {
        let totals = InvoiceTotals::compute(Money::from_minor(15000), &[line(2, 20000)]).unwrap();
        assert_eq!(totals.parts_total, Money::from_minor(40000));
        assert_eq!(totals.sub_total, Money::from_minor(55000));
        assert_eq!(totals.grand_total, Money::from_minor(55000));
    }

    #[test]
    fn no_lines_yields_service_charge_only() {
        let totals = InvoiceTotals::compute(Money::from_minor(15000), &[]).unwrap();
        assert_eq!(totals.parts_total, Money::ZERO);
        assert_eq!(totals.grand_total, Money::from_minor(15000));
    }

    #[test]
    fn overflow_is_rejected() {
        let result = InvoiceTotals::compute(Money::ZERO, &[line(i64::MAX, 2)]);
        assert!(result.is_err());
    }

    proptest! {
        #[test]
        fn grand_total_always_equals_sub_total(
            service_minor in 0i64..1_000_000,
            lines in proptest::collection::vec((1i64..100, 0i64..100_000), 0..8),
        ) {
            let lines: Vec<PartLine> = lines
                .into_iter()
                .map(|(qty, price)| line(qty, price))
                .collect();
            let totals = InvoiceTotals::compute(Money::from_minor(service_minor), &lines).unwrap();
            prop_assert_eq!(totals.grand_total, totals.sub_total);
            prop_assert_eq!(
                totals.sub_total.minor(),
                totals.parts_total.minor() + service_minor
            );
        }
    }
}
