use proptest::prelude::*;
use utx_quorum::modal_agreement;
use utx_types::Checksum256;

prop_compose! {
    fn arb_reports()(choices in proptest::collection::vec(0u8..4, 1..30)) -> Vec<(usize, Checksum256)> {
        choices
            .into_iter()
            .enumerate()
            .map(|(i, c)| (i, Checksum256::digest([c])))
            .collect()
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_modal_is_deterministic(reports in arb_reports()) {
        let first = modal_agreement(reports.clone()).unwrap();
        for _ in 0..5 {
            prop_assert_eq!(modal_agreement(reports.clone()).unwrap(), first);
        }
    }

    #[test]
    fn prop_modal_count_is_maximal(reports in arb_reports()) {
        let outcome = modal_agreement(reports.clone()).unwrap();
        for r in &reports {
            let c = reports.iter().filter(|x| x.1 == r.1).count();
            prop_assert!(c <= outcome.count);
        }
        let winner = reports.iter().filter(|x| x.1 == outcome.hash).count();
        prop_assert_eq!(winner, outcome.count);
    }

    #[test]
    fn prop_tie_break_prefers_earliest(reports in arb_reports()) {
        let outcome = modal_agreement(reports.clone()).unwrap();
        let first_idx = reports.iter().position(|r| r.1 == outcome.hash).unwrap();
        for r in reports.iter().take(first_idx) {
            let c = reports.iter().filter(|x| x.1 == r.1).count();
            prop_assert!(c < outcome.count);
        }
    }
}
