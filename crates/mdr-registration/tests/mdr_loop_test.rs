//! End-to-end tests for the model-driven registration loop.

use burn::backend::Autodiff;
use burn_ndarray::NdArray;
use mdr_core::spatial::{Point2, Spacing2};
use mdr_core::ImageStack;
use mdr_models::ConstantModel;
use mdr_registration::registrar::max_magnitude;
use mdr_registration::{
    MdrConfig, MdrError, MdrLoop, RegistrationConfig, TerminationReason,
};

type B = Autodiff<NdArray<f32>>;

fn stack_from(frames: Vec<Vec<f32>>, shape: [usize; 2]) -> ImageStack<B> {
    let device = Default::default();
    let num_frames = frames.len();
    let values: Vec<f32> = frames.into_iter().flatten().collect();
    ImageStack::from_vec(
        values,
        [num_frames, shape[0], shape[1]],
        Point2::origin(),
        Spacing2::ones(),
        &device,
    )
}

fn blob(shape: [usize; 2], cx: f64, cy: f64) -> Vec<f32> {
    let mut values = Vec::with_capacity(shape[0] * shape[1]);
    for y in 0..shape[0] {
        for x in 0..shape[1] {
            let d2 = (x as f64 - cx).powi(2) + (y as f64 - cy).powi(2);
            values.push((100.0 * (-d2 / 6.0).exp()) as f32);
        }
    }
    values
}

fn fast_config() -> MdrConfig {
    MdrConfig {
        precision: 0.5,
        max_iterations: 3,
        registration: RegistrationConfig {
            max_iterations: 15,
            learning_rate: 0.2,
            grid_spacing: [4.0, 4.0],
            ..Default::default()
        },
    }
}

#[test]
fn static_series_converges_in_one_pass() {
    let frame = blob([10, 10], 5.0, 5.0);
    let stack = stack_from(vec![frame.clone(), frame.clone(), frame], [10, 10]);

    let looper = MdrLoop::new(ConstantModel::new(3), fast_config()).unwrap();
    let output = looper.run(&stack).unwrap();

    // A motionless series gives a fitting target identical to every
    // frame, so the fields never leave zero.
    assert_eq!(output.termination, TerminationReason::Converged);
    assert_eq!(output.iterations_run, 1);
    for field in &output.fields {
        assert!(max_magnitude(field) < 1e-5);
    }

    let input = stack.to_vec();
    let corrected = output.coregistered.to_vec();
    for (a, b) in input.iter().zip(corrected.iter()) {
        assert!((a - b).abs() < 1e-4);
    }

    assert_eq!(output.parameter_maps.len(), 1);
    assert_eq!(output.parameter_maps[0].name, "mean");
    assert_eq!(output.diagnostics.iterations.len(), 1);
}

#[test]
fn iteration_cap_reports_forced_termination() {
    let shape = [12, 12];
    let stack = stack_from(
        vec![blob(shape, 6.0, 6.0), blob(shape, 7.5, 6.0), blob(shape, 6.0, 6.0)],
        shape,
    );

    let config = MdrConfig {
        // Unreachable precision forces the cap to fire.
        precision: 1e-9,
        max_iterations: 1,
        ..fast_config()
    };
    let looper = MdrLoop::new(ConstantModel::new(3), config).unwrap();
    let output = looper.run(&stack).unwrap();

    assert_eq!(output.termination, TerminationReason::Forced);
    assert_eq!(output.iterations_run, 1);
    // The moving frame produced a real deformation.
    let record = &output.diagnostics.iterations[0];
    assert!(record.field_change > 1e-9);
}

#[test]
fn preset_cancel_token_returns_before_any_pass() {
    let frame = blob([8, 8], 4.0, 4.0);
    let stack = stack_from(vec![frame.clone(), frame.clone(), frame], [8, 8]);

    let looper = MdrLoop::new(ConstantModel::new(3), fast_config()).unwrap();
    looper
        .cancel_token()
        .store(true, std::sync::atomic::Ordering::Relaxed);
    let output = looper.run(&stack).unwrap();

    assert_eq!(output.termination, TerminationReason::Cancelled);
    assert_eq!(output.iterations_run, 0);
    assert!(output.diagnostics.iterations.is_empty());

    // The output still carries the uncorrected series, zero fields and
    // maps fitted to it.
    assert_eq!(output.coregistered.to_vec(), stack.to_vec());
    assert_eq!(output.fields.len(), 3);
    for field in &output.fields {
        assert!(max_magnitude(field) < 1e-9);
    }
    assert_eq!(output.parameter_maps.len(), 1);
}

#[test]
fn frame_count_mismatch_is_rejected() {
    let frame = blob([8, 8], 4.0, 4.0);
    let stack = stack_from(vec![frame.clone(), frame], [8, 8]);

    let looper = MdrLoop::new(ConstantModel::new(3), fast_config()).unwrap();
    let err = looper.run(&stack).unwrap_err();
    assert!(matches!(
        err,
        MdrError::FrameCountMismatch {
            expected: 3,
            actual: 2,
            ..
        }
    ));
}

#[test]
fn dead_pixels_are_flagged_without_stopping_the_loop() {
    let shape = [8, 8];
    let echo_times: Vec<f64> = vec![10.0, 30.0, 60.0, 100.0];
    // Signal-free 3x3 block; its centre cannot pick up signal from
    // sub-pixel resampling.
    let in_block = |p: usize| (2..5).contains(&(p / 8)) && (2..5).contains(&(p % 8));
    let centre = 3 * 8 + 3;

    // A motionless decay series outside the block.
    let frames: Vec<Vec<f32>> = echo_times
        .iter()
        .map(|te| {
            (0..shape[0] * shape[1])
                .map(|p| {
                    if in_block(p) {
                        0.0
                    } else {
                        (200.0 * (-te / (50.0 + p as f64)).exp()) as f32
                    }
                })
                .collect()
        })
        .collect();
    let stack = stack_from(frames, shape);

    let model = mdr_models::MonoExponentialModel::t2(echo_times);
    // Gentle steps: fit residuals on a motionless series are at rounding
    // level, so the fields must stay well inside the precision threshold.
    let config = MdrConfig {
        registration: RegistrationConfig {
            max_iterations: 5,
            learning_rate: 1e-4,
            grid_spacing: [4.0, 4.0],
            ..Default::default()
        },
        ..fast_config()
    };
    let looper = MdrLoop::new(model, config).unwrap();
    let output = looper.run(&stack).unwrap();

    assert_eq!(output.termination, TerminationReason::Converged);
    assert!(output.failed_pixels.contains(&centre));
    assert!(output.parameter_maps[1].values[centre].is_nan());

    // A pixel away from the block still gets an accurate T2 estimate.
    let pixel = 6 * 8 + 6;
    let t2 = output.parameter_maps[1].values[pixel];
    let expected = 50.0 + pixel as f64;
    assert!((t2 - expected).abs() / expected < 0.05, "T2: {}", t2);
}

#[test]
fn injected_shift_is_recovered_within_half_a_pixel() {
    let shape = [16, 16];
    // Frame 1 carries a one-pixel shift along x; the other frames are
    // still of the same object.
    let stack = stack_from(
        vec![blob(shape, 8.0, 8.0), blob(shape, 9.0, 8.0), blob(shape, 8.0, 8.0)],
        shape,
    );

    let config = MdrConfig {
        precision: 0.5,
        max_iterations: 5,
        registration: RegistrationConfig {
            max_iterations: 150,
            learning_rate: 0.05,
            grid_spacing: [4.0, 4.0],
            ..Default::default()
        },
    };
    let looper = MdrLoop::new(ConstantModel::new(3), config).unwrap();
    let output = looper.run(&stack).unwrap();

    assert_eq!(output.termination, TerminationReason::Converged);

    // The converged field for the shifted frame must point back to the
    // true object position. Average the x component over the blob core;
    // at unit spacing mm and pixels coincide.
    let field: Vec<f32> = output.fields[1].clone().into_data().iter::<f32>().collect();
    let mut sum = 0.0f64;
    let mut count = 0usize;
    for y in 6..=10 {
        for x in 6..=10 {
            sum += field[y * shape[1] + x] as f64;
            count += 1;
        }
    }
    let mean_dx = sum / count as f64;
    assert!((mean_dx - 1.0).abs() < 0.5, "mean dx: {}", mean_dx);
}

#[test]
fn repeated_runs_are_deterministic() {
    let shape = [10, 10];
    let stack = stack_from(
        vec![blob(shape, 5.0, 5.0), blob(shape, 6.0, 5.5), blob(shape, 5.0, 5.0)],
        shape,
    );

    let first = MdrLoop::new(ConstantModel::new(3), fast_config())
        .unwrap()
        .run(&stack)
        .unwrap();
    let second = MdrLoop::new(ConstantModel::new(3), fast_config())
        .unwrap()
        .run(&stack)
        .unwrap();

    assert_eq!(first.termination, second.termination);
    assert_eq!(first.iterations_run, second.iterations_run);
    assert_eq!(first.coregistered.to_vec(), second.coregistered.to_vec());
}

#[test]
fn divergent_frames_are_reset_not_propagated() {
    let shape = [10, 10];
    let stack = stack_from(
        vec![blob(shape, 5.0, 5.0), blob(shape, 7.0, 5.0), blob(shape, 5.0, 5.0)],
        shape,
    );

    let mut config = fast_config();
    // A limit no optimizer step can stay under.
    config.registration.divergence_limit = Some(1e-12);
    let looper = MdrLoop::new(ConstantModel::new(3), config).unwrap();
    let output = looper.run(&stack).unwrap();

    let record = &output.diagnostics.iterations[0];
    assert!(record.frames.iter().any(|f| f.diverged));
    // Reset frames keep the original data and a zero field.
    for field in &output.fields {
        assert!(max_magnitude(field) < 1e-9);
    }
    assert_eq!(output.coregistered.to_vec(), stack.to_vec());
}
