use pageview::geometry::Size;
use pageview::layout::{
    CalculatorSetup, DefaultPageSizeCalculator, FitPolicy, FixPageSizeCalculator,
    PageSizeCalculator,
};

fn setup(policy: FitPolicy, max: Size, viewport: Size, fit_each_page: bool) -> CalculatorSetup {
    CalculatorSetup {
        fit_policy: policy,
        original_max_width: max,
        original_max_height: max,
        viewport,
        fit_each_page,
    }
}

/// Aspect ratio kept within one pixel of rounding
fn assert_aspect(original: Size, scaled: Size) {
    let lhs = i64::from(scaled.width) * i64::from(original.height);
    let rhs = i64::from(scaled.height) * i64::from(original.width);
    let tolerance = i64::from(original.width.max(original.height));
    assert!(
        (lhs - rhs).abs() <= tolerance,
        "{original:?} -> {scaled:?} changed the aspect ratio"
    );
}

#[test]
fn test_fix_calculator_fits_tall_page_into_viewport() {
    let calculator = FixPageSizeCalculator::new(Size::new(720, 1280));
    let size = calculator.calculate(Size::new(1300, 14000));

    assert!(size.width <= 720);
    assert!(size.height <= 1280);
    assert_eq!(size.height, 1280);
    assert_aspect(Size::new(1300, 14000), size);
}

#[test]
fn test_default_calculator_both_fit_each_page_stays_in_viewport() {
    let viewport = Size::new(1200, 1700);
    let calculator = DefaultPageSizeCalculator::new(&setup(
        FitPolicy::Both,
        Size::new(100_000, 100_000),
        viewport,
        true,
    ));
    let size = calculator.calculate(Size::new(100_000, 100_000));

    assert!(size.width <= viewport.width);
    assert!(size.height <= viewport.height);
    assert_eq!(size, Size::new(1200, 1200));
}

#[test]
fn test_width_policy_scales_pages_by_envelope_ratio() {
    let calculator = DefaultPageSizeCalculator::new(&setup(
        FitPolicy::Width,
        Size::new(612, 792),
        Size::new(1224, 1000),
        false,
    ));
    assert_eq!(calculator.optimal_max_width(), Size::new(1224, 1584));

    // a half-size page stays half the width of the widest one
    assert_eq!(calculator.calculate(Size::new(306, 396)), Size::new(612, 792));
}

#[test]
fn test_height_policy_fills_viewport_height() {
    let calculator = DefaultPageSizeCalculator::new(&setup(
        FitPolicy::Height,
        Size::new(600, 800),
        Size::new(1000, 400),
        false,
    ));
    assert_eq!(calculator.calculate(Size::new(600, 800)), Size::new(300, 400));
}

#[test]
fn test_calculate_preserves_aspect_ratio() {
    let pages = [
        Size::new(612, 792),
        Size::new(842, 595),
        Size::new(1, 1000),
        Size::new(3000, 7),
        Size::new(1300, 14000),
    ];
    for policy in [FitPolicy::Width, FitPolicy::Height, FitPolicy::Both] {
        for fit_each_page in [false, true] {
            let calculator = DefaultPageSizeCalculator::new(&setup(
                policy,
                Size::new(3000, 14000),
                Size::new(1080, 1920),
                fit_each_page,
            ));
            for page in pages {
                let scaled = calculator.calculate(page);
                assert_aspect(page, scaled);
            }
        }
    }
}

#[test]
fn test_both_policy_never_exceeds_viewport_with_fit_each_page() {
    let viewport = Size::new(1080, 1920);
    let calculator = DefaultPageSizeCalculator::new(&setup(
        FitPolicy::Both,
        Size::new(5000, 5000),
        viewport,
        true,
    ));
    for page in [Size::new(5000, 10), Size::new(10, 5000), Size::new(4000, 3000)] {
        let size = calculator.calculate(page);
        assert!(size.width <= viewport.width, "{page:?} -> {size:?}");
        assert!(size.height <= viewport.height, "{page:?} -> {size:?}");
    }
}

#[test]
fn test_degenerate_pages_collapse_to_zero() {
    let calculator = DefaultPageSizeCalculator::new(&setup(
        FitPolicy::Width,
        Size::new(612, 792),
        Size::new(1080, 1920),
        false,
    ));
    assert_eq!(calculator.calculate(Size::new(0, 100)), Size::ZERO);
    assert_eq!(calculator.calculate(Size::new(100, -1)), Size::ZERO);

    let fix = FixPageSizeCalculator::new(Size::new(720, 1280));
    assert_eq!(fix.calculate(Size::new(-5, 10)), Size::ZERO);
}

#[test]
fn test_degenerate_setup_is_coerced() {
    // zero viewport and envelope behave like 1x1 rather than dividing by zero
    let calculator = DefaultPageSizeCalculator::new(&setup(
        FitPolicy::Width,
        Size::new(0, 0),
        Size::new(0, 0),
        false,
    ));
    assert!(calculator.width_ratio().is_finite());
    assert!(calculator.height_ratio().is_finite());
}

#[test]
fn test_setup_is_idempotent() {
    let input = setup(
        FitPolicy::Both,
        Size::new(842, 1191),
        Size::new(1080, 1920),
        false,
    );
    let mut calculator = DefaultPageSizeCalculator::new(&input);
    let first = (
        calculator.optimal_max_width(),
        calculator.optimal_max_height(),
        calculator.calculate(Size::new(595, 842)),
    );

    calculator.setup(&input);
    let second = (
        calculator.optimal_max_width(),
        calculator.optimal_max_height(),
        calculator.calculate(Size::new(595, 842)),
    );
    assert_eq!(first, second);
}

#[test]
fn test_none_policy_keeps_original_sizes() {
    let calculator = DefaultPageSizeCalculator::new(&setup(
        FitPolicy::None,
        Size::new(612, 792),
        Size::new(100, 100),
        false,
    ));
    assert_eq!(calculator.calculate(Size::new(500, 700)), Size::new(500, 700));
}
