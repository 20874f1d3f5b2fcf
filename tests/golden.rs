//! Golden file integration tests.
//!
//! Reads tests/testdata/strategy_golden.json and checks that every imaging
//! context resolves to the recorded slice count, support, plane count and
//! w-step.

use serde::Deserialize;

use skyreduce_core::advisory::Advisory;
use skyreduce_core::strategy::{Context, Overrides, StrategySelector};

// ---------------------------------------------------------------------------
// Golden data structures
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct GoldenData {
    #[allow(dead_code)]
    description: String,
    advisory: Advisory,
    cases: Vec<GoldenCase>,
}

#[derive(Deserialize)]
struct GoldenCase {
    context: String,
    #[serde(default)]
    nwslabs: Option<usize>,
    #[serde(default)]
    nwplanes: Option<usize>,
    #[serde(default)]
    wstep: Option<f64>,
    expect: Expected,
}

#[derive(Deserialize)]
struct Expected {
    imaging_context: String,
    vis_slices: usize,
    support: usize,
    nwplanes: usize,
    wstep: f64,
}

fn load_golden_data() -> GoldenData {
    let path = concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/tests/testdata/strategy_golden.json"
    );
    let data = std::fs::read_to_string(path).expect("failed to read golden file");
    serde_json::from_str(&data).expect("failed to parse golden JSON")
}

fn selector_for(case: &GoldenCase) -> StrategySelector {
    StrategySelector::new(16).with_overrides(Overrides {
        nwslabs: case.nwslabs,
        nwplanes: case.nwplanes,
        wstep: case.wstep,
        ..Overrides::default()
    })
}

// ---------------------------------------------------------------------------
// Golden: resolved strategies
// ---------------------------------------------------------------------------

#[test]
fn golden_strategy_table() {
    let data = load_golden_data();
    assert!(!data.cases.is_empty());
    for case in &data.cases {
        let context: Context = case.context.parse().unwrap();
        let s = selector_for(case).resolve(context, &[data.advisory]).unwrap();
        let label = format!("{} {:?} {:?}", case.context, case.nwslabs, case.nwplanes);

        assert_eq!(s.imaging_context.name(), case.expect.imaging_context, "{label}");
        assert_eq!(s.vis_slices, case.expect.vis_slices, "{label}");
        assert_eq!(s.support, case.expect.support, "{label}");
        assert_eq!(s.nwplanes, case.expect.nwplanes, "{label}");
        let tolerance = 1e-9 * case.expect.wstep.abs().max(1.0);
        assert!(
            (s.wstep - case.expect.wstep).abs() <= tolerance,
            "{label}: wstep {} != {}",
            s.wstep,
            case.expect.wstep
        );
    }
}

#[test]
fn golden_contexts_cover_every_variant() {
    let data = load_golden_data();
    for context in Context::ALL {
        assert!(
            data.cases.iter().any(|c| c.context == context.name()),
            "no golden case for {context}"
        );
    }
}

// ---------------------------------------------------------------------------
// Golden: hybrid support is even and never below the floor
// ---------------------------------------------------------------------------

#[test]
fn golden_hybrid_support_is_even() {
    let data = load_golden_data();
    for case in data.cases.iter().filter(|c| c.context == "wprojectwstack") {
        let s = selector_for(case)
            .resolve(Context::HybridWProjectWStack, &[data.advisory])
            .unwrap();
        assert_eq!(s.support % 2, 0);
        assert!(s.support >= 14);
        assert!(s.nwplanes >= 1);
    }
}

#[test]
fn golden_advisory_order_does_not_matter_for_two_d() {
    let data = load_golden_data();
    let other = Advisory {
        wstep: 1.0,
        wprojection_planes: 3,
        nwpixels: 8,
        ..data.advisory
    };
    let selector = StrategySelector::new(16);
    let a = selector.resolve(Context::TwoD, &[data.advisory, other]).unwrap();
    let b = selector.resolve(Context::TwoD, &[other, data.advisory]).unwrap();
    assert_eq!(a, b);
}
