//! Whole-image fitting must isolate pathological pixels.

use mdr_models::{fit_image, MonoExponentialModel, SignalModel};

#[test]
fn one_dead_pixel_does_not_poison_the_image() {
    let echo_times: Vec<f64> = (1..9).map(|i| i as f64 * 15.0).collect();
    let model = MonoExponentialModel::t2(echo_times.clone());
    let num_frames = echo_times.len();

    // 3x3 image, pixel 4 carries no signal.
    let num_pixels = 9;
    let mut series = vec![0.0; num_frames * num_pixels];
    for (t, te) in echo_times.iter().enumerate() {
        for p in 0..num_pixels {
            series[t * num_pixels + p] = if p == 4 {
                0.0
            } else {
                150.0 * (-te / (40.0 + p as f64)).exp()
            };
        }
    }

    let fit = fit_image(&model, &series, num_frames);

    assert_eq!(fit.failed_pixels, vec![4]);
    assert!(fit.parameter_maps[1][4].is_nan());

    for p in (0..num_pixels).filter(|p| *p != 4) {
        let t2 = fit.parameter_maps[1][p];
        let expected = 40.0 + p as f64;
        assert!(
            (t2 - expected).abs() / expected < 0.01,
            "pixel {}: T2 {} vs {}",
            p,
            t2,
            expected
        );
    }

    // The dead pixel passes through unchanged.
    for t in 0..num_frames {
        assert_eq!(fit.fitted[t * num_pixels + 4], 0.0);
    }
}

#[test]
fn parameter_names_line_up_with_maps() {
    let model = MonoExponentialModel::t2star(vec![2.0, 6.0, 12.0, 20.0]);
    let names = model.parameter_names();
    assert_eq!(names, vec!["S0".to_string(), "T2star".to_string()]);

    let series = vec![10.0; 4 * 2];
    let fit = fit_image(&model, &series, 4);
    assert_eq!(fit.parameter_maps.len(), names.len());
}
