#[allow(dead_code)]
mod common;

use approx::assert_abs_diff_eq;
use ndarray::Array3;

use correl_core::resample::{
    deform, resample_parallel, resample_sequential, sample_at, Interpolation, SamplingGrid,
};
use correl_core::transform::Phi;
use correl_core::volume::{bin, bin_mask, included_centroid, Crop, Gradients, Margin};

fn ramp(shape: [usize; 3]) -> Array3<f32> {
    common::render(shape, |[z, y, x]| 2.0 * z + 0.5 * y - 1.5 * x + 100.0)
}

#[test]
fn test_linear_interpolation_is_exact_on_ramp() {
    let data = ramp([6, 8, 8]);
    let v = sample_at(&data.view(), [2.25, 3.5, 4.75], Interpolation::Linear);
    assert_abs_diff_eq!(v, 2.0 * 2.25 + 0.5 * 3.5 - 1.5 * 4.75 + 100.0, epsilon = 1e-4);
}

#[test]
fn test_cubic_interpolation_reproduces_ramp_inside() {
    let data = ramp([8, 8, 8]);
    let v = sample_at(&data.view(), [3.4, 4.6, 3.2], Interpolation::Cubic);
    assert_abs_diff_eq!(v, 2.0 * 3.4 + 0.5 * 4.6 - 1.5 * 3.2 + 100.0, epsilon = 1e-3);
}

#[test]
fn test_nearest_interpolation_rounds() {
    let data = ramp([4, 4, 4]);
    let v = sample_at(&data.view(), [1.4, 2.6, 0.51], Interpolation::Nearest);
    assert_abs_diff_eq!(v, data[[1, 3, 1]]);
}

#[test]
fn test_out_of_bounds_sample_is_nan() {
    let data = ramp([4, 4, 4]);
    for interpolation in [Interpolation::Nearest, Interpolation::Linear, Interpolation::Cubic] {
        let v = sample_at(&data.view(), [1.0, 1.0, 3.5], interpolation);
        assert!(v.is_nan(), "{} gave {} outside the image", interpolation, v);
        let v = sample_at(&data.view(), [-0.6, 1.0, 1.0], interpolation);
        assert!(v.is_nan(), "{} gave {} outside the image", interpolation, v);
    }
}

#[test]
fn test_planar_image_ignores_z_position() {
    let data = ramp([1, 8, 8]);
    let v = sample_at(&data.view(), [0.0, 2.5, 2.5], Interpolation::Linear);
    assert_abs_diff_eq!(v, 0.5 * 2.5 - 1.5 * 2.5 + 100.0, epsilon = 1e-4);
}

#[test]
fn test_interpolation_order_round_trip() {
    assert_eq!(Interpolation::from_order(0), Interpolation::Nearest);
    assert_eq!(Interpolation::from_order(1), Interpolation::Linear);
    assert_eq!(Interpolation::from_order(3), Interpolation::Cubic);
    assert_eq!(Interpolation::Cubic.order(), 3);
}

#[test]
fn test_identity_resample_returns_source() {
    let data = common::render([4, 12, 12], common::trig);
    let grid = SamplingGrid::full([4, 12, 12]);
    let out = resample_sequential(&data.view(), &Phi::identity(), &grid, Interpolation::Linear);
    for (a, b) in out.iter().zip(data.iter()) {
        assert_abs_diff_eq!(a, b, epsilon = 1e-6);
    }
}

#[test]
fn test_parallel_resample_matches_sequential() {
    let data = common::render([10, 16, 16], common::trig);
    let phi = Phi::from_translation([0.3, -0.6, 1.1]);
    let grid = SamplingGrid::full([10, 16, 16]);
    let seq = resample_sequential(&data.view(), &phi, &grid, Interpolation::Cubic);
    let par = resample_parallel(&data.view(), &phi, &grid, Interpolation::Cubic);
    for (a, b) in seq.iter().zip(par.iter()) {
        assert!(a == b || (a.is_nan() && b.is_nan()), "{} != {}", a, b);
    }
}

#[test]
fn test_deform_moves_content_forward() {
    // A point feature at x = 5 moves to x = 7 under a +2 x translation.
    let mut data = Array3::<f32>::zeros((1, 1, 12));
    data[[0, 0, 5]] = 1.0;
    let out = deform(&data.view(), &Phi::from_translation([0.0, 0.0, 2.0]), Interpolation::Linear)
        .unwrap();
    assert_abs_diff_eq!(out[[0, 0, 7]], 1.0, epsilon = 1e-6);
    assert_abs_diff_eq!(out[[0, 0, 5]], 0.0, epsilon = 1e-6);
    assert!(out[[0, 0, 0]].is_nan());
}

#[test]
fn test_deform_rejects_singular_operator() {
    let data = Array3::<f32>::zeros((2, 2, 2));
    let mut phi = Phi::identity();
    phi.0[(1, 1)] = 0.0;
    assert!(deform(&data.view(), &phi, Interpolation::Linear).is_err());
}

#[test]
fn test_gradients_of_ramp() {
    let data = ramp([5, 6, 7]);
    let g = Gradients::of(&data.view());
    for index in [[0, 0, 0], [2, 3, 3], [4, 5, 6]] {
        let [gz, gy, gx] = g.at(index);
        assert_abs_diff_eq!(gz, 2.0, epsilon = 1e-4);
        assert_abs_diff_eq!(gy, 0.5, epsilon = 1e-4);
        assert_abs_diff_eq!(gx, -1.5, epsilon = 1e-4);
    }
}

#[test]
fn test_gradient_of_unit_axis_is_zero() {
    let data = ramp([1, 6, 6]);
    let g = Gradients::of(&data.view());
    assert!(g.z.iter().all(|&v| v == 0.0));
}

#[test]
fn test_auto_margin() {
    // ceil(0.732 * 64 / 2) = 24
    assert_eq!(Margin::auto([64, 64, 64]), Margin([24, 24, 24]));
    assert_eq!(Margin::auto([1, 64, 64]), Margin([0, 24, 24]));
}

#[test]
fn test_margin_scales_down_but_keeps_one_voxel() {
    assert_eq!(Margin([0, 16, 3]).scaled_down(4), Margin([0, 4, 1]));
    assert_eq!(Margin([5, 5, 5]).scaled_down(1), Margin([5, 5, 5]));
}

#[test]
fn test_crop_from_margin() {
    let crop = Crop::from_margin([1, 20, 30], Margin([0, 4, 5])).unwrap();
    assert_eq!(crop.start, [0, 4, 5]);
    assert_eq!(crop.shape, [1, 12, 20]);
    assert_eq!(crop.voxel_count(), 240);
    assert!(Crop::from_margin([1, 8, 30], Margin([0, 4, 5])).is_err());
}

#[test]
fn test_bin_averages_blocks() {
    let data = ramp([4, 4, 4]);
    let binned = bin(&data.view(), 2).unwrap();
    assert_eq!(binned.dim(), (2, 2, 2));
    // Block mean of a ramp is the ramp at the block centre.
    assert_abs_diff_eq!(binned[[0, 0, 0]], 2.0 * 0.5 + 0.5 * 0.5 - 1.5 * 0.5 + 100.0, epsilon = 1e-4);
}

#[test]
fn test_bin_keeps_planar_z() {
    let data = ramp([1, 8, 6]);
    let binned = bin(&data.view(), 2).unwrap();
    assert_eq!(binned.dim(), (1, 4, 3));
    assert!(bin(&data.view(), 0).is_err());
}

#[test]
fn test_bin_mask_excludes_whole_block() {
    let mut mask = Array3::from_elem((1, 4, 4), false);
    mask[[0, 3, 0]] = true;
    let binned = bin_mask(&mask.view(), 2).unwrap();
    assert!(binned[[0, 1, 0]]);
    assert_eq!(binned.iter().filter(|&&m| m).count(), 1);
}

#[test]
fn test_included_centroid() {
    let mut mask = Array3::from_elem((1, 4, 4), false);
    for y in 0..4 {
        mask[[0, y, 0]] = true;
        mask[[0, y, 1]] = true;
    }
    let c = included_centroid(&mask.view(), [0, 10, 10]).unwrap();
    assert_abs_diff_eq!(c[1], 11.5);
    assert_abs_diff_eq!(c[2], 12.5);

    let all = Array3::from_elem((1, 2, 2), true);
    assert!(included_centroid(&all.view(), [0, 0, 0]).is_none());
}
