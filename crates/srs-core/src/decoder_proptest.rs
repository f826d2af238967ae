#[cfg(test)]
mod proptest_decoder {
    use crate::config::ChannelConfig;
    use crate::decoder::*;
    use proptest::prelude::*;

    const MAX: f64 = 14.0;
    const MIN: f64 = 7.0;
    const BAND: f64 = 1.4;

    fn decoder() -> PositionDecoder {
        let config = ChannelConfig {
            duty_max_pct: MAX,
            duty_min_pct: MIN,
            tolerance_pct: 20.0,
            ..ChannelConfig::default()
        }
        .validate()
        .expect("default thresholds are valid");
        PositionDecoder::new(&config)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(10000))]

        // Property: the dead zone between the two windows never moves the actuator
        #[test]
        fn dead_zone_always_holds(duty in (MIN + BAND + 1e-9)..(MAX - BAND - 1e-9)) {
            prop_assert_eq!(decoder().decode(duty), PositionCommand::Hold);
        }

        // Property: readings inside the upper window always extend
        #[test]
        fn upper_window_extends(offset in -BAND..=BAND) {
            prop_assert_eq!(decoder().decode(MAX + offset), PositionCommand::Extend);
        }

        // Property: readings inside the lower window always retract
        #[test]
        fn lower_window_retracts(offset in -BAND..=BAND) {
            prop_assert_eq!(decoder().decode(MIN + offset), PositionCommand::Retract);
        }

        // Property: readings far outside both windows hold
        #[test]
        fn out_of_range_holds(duty in prop_oneof![-1000.0f64..(MIN - BAND - 1e-9), (MAX + BAND + 1e-9)..1000.0f64]) {
            prop_assert_eq!(decoder().decode(duty), PositionCommand::Hold);
        }

        // Property: within the plausible range a larger reading never decodes
        // to a lower-ranked command than a smaller one
        #[test]
        fn decode_is_monotonic_within_plausible_range(
            a in (MIN - BAND)..=(MAX + BAND),
            b in (MIN - BAND)..=(MAX + BAND),
        ) {
            let d = decoder();
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            let rank = |cmd: PositionCommand| match cmd {
                PositionCommand::Retract => 0,
                PositionCommand::Hold => 1,
                PositionCommand::Extend => 2,
            };
            prop_assert!(rank(d.decode(lo)) <= rank(d.decode(hi)));
        }
    }
}
