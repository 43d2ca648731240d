//! 单位换算的属性测试
//!
//! 使用 proptest 验证步数换算的往返性质。

use proptest::prelude::*;
use stage_protocol::{AxisScale, Unit, convert_from_steps, convert_to_steps};

fn unit_strategy() -> impl Strategy<Value = Unit> {
    prop::sample::select(Unit::ALL.to_vec())
}

proptest! {
    /// 任意单位下 to_steps -> from_steps 往返
    #[test]
    fn steps_roundtrip(
        x in -1.0e6..1.0e6f64,
        unit in unit_strategy(),
        steps_per_mm in 1.0..100_000.0f64,
        steps_per_rad in 1.0..1.0e7f64,
    ) {
        let scale = AxisScale::new(steps_per_mm, steps_per_rad).unwrap();
        let back = convert_from_steps(convert_to_steps(x, unit, &scale), unit, &scale);
        let tolerance = 1e-9 * x.abs().max(1.0);
        prop_assert!((back - x).abs() <= tolerance, "{} {} -> {}", x, unit, back);
    }

    /// 换算保持符号
    #[test]
    fn steps_preserve_sign(x in -1.0e6..1.0e6f64, unit in unit_strategy()) {
        let scale = AxisScale::default();
        let steps = convert_to_steps(x, unit, &scale);
        prop_assert_eq!(steps.signum(), x.signum());
    }

    /// 微米与毫米的比例恒为 1000
    #[test]
    fn micrometer_is_thousandth_of_millimeter(x in -1.0e4..1.0e4f64) {
        let scale = AxisScale::default();
        let a = convert_to_steps(x * 1_000.0, Unit::Micrometer, &scale);
        let b = convert_to_steps(x, Unit::Millimeter, &scale);
        prop_assert!((a - b).abs() <= 1e-9 * b.abs().max(1.0));
    }
}

#[test]
fn roundtrip_fixed_values_all_units() {
    let scale = AxisScale::new(400.0, 3_183.098_861_837_907).unwrap();
    for unit in Unit::ALL {
        for x in [0.0, 1.0, -2.5, 123.456, 1e-3] {
            let back = convert_from_steps(convert_to_steps(x, unit, &scale), unit, &scale);
            assert!((back - x).abs() < 1e-9, "{unit}: {x} -> {back}");
        }
    }
}
