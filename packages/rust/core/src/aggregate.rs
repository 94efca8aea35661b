//! Final ordering of enriched tenders.

use tenderwatch_shared::EnrichedTender;

/// Order tenders by budget, largest first.
///
/// A missing budget ranks as zero. The sort is stable, so equal budgets keep
/// their encounter order.
pub fn aggregate(mut tenders: Vec<EnrichedTender>) -> Vec<EnrichedTender> {
    tenders.sort_by(|a, b| b.ranking_budget().total_cmp(&a.ranking_budget()));
    tenders
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tender(id: &str, budget: Option<f64>) -> EnrichedTender {
        EnrichedTender {
            id: id.into(),
            budget,
            ..Default::default()
        }
    }

    fn ids(tenders: &[EnrichedTender]) -> Vec<&str> {
        tenders.iter().map(|t| t.id.as_str()).collect()
    }

    #[test]
    fn sorts_descending_by_budget() {
        let out = aggregate(vec![
            tender("a", Some(10.0)),
            tender("b", Some(500.0)),
            tender("c", Some(75.5)),
        ]);
        assert_eq!(ids(&out), ["b", "c", "a"]);
    }

    #[test]
    fn missing_budget_ranks_as_zero() {
        let out = aggregate(vec![
            tender("none", None),
            tender("neg", Some(-1.0)),
            tender("one", Some(1.0)),
        ]);
        assert_eq!(ids(&out), ["one", "none", "neg"]);
    }

    #[test]
    fn ties_keep_encounter_order() {
        let out = aggregate(vec![
            tender("first", Some(100.0)),
            tender("unset", None),
            tender("second", Some(100.0)),
            tender("zero", Some(0.0)),
        ]);
        assert_eq!(ids(&out), ["first", "second", "unset", "zero"]);
    }

    #[test]
    fn empty_input() {
        assert!(aggregate(Vec::new()).is_empty());
    }
}
