use crate::utils;

/// Compute the dot product of two 3d vectors.
#[inline]
pub fn dot_product3(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

/// Compute the cross product of two 3d vectors.
///
/// Example:
///
/// ```
/// use handgeo_3d::linalg::cross_vec3;
///
/// let z = cross_vec3(&[1.0, 0.0, 0.0], &[0.0, 1.0, 0.0]);
/// assert_eq!(z, [0.0, 0.0, 1.0]);
/// ```
#[inline]
pub fn cross_vec3(a: &[f64; 3], b: &[f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

/// Component-wise difference `a - b`.
#[inline]
pub fn sub_vec3(a: &[f64; 3], b: &[f64; 3]) -> [f64; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

/// Component-wise sum `a + b`.
#[inline]
pub fn add_vec3(a: &[f64; 3], b: &[f64; 3]) -> [f64; 3] {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2]]
}

/// Multiply a 3d vector by a scalar.
#[inline]
pub fn scale_vec3(a: &[f64; 3], s: f64) -> [f64; 3] {
    [a[0] * s, a[1] * s, a[2] * s]
}

/// Euclidean norm of a 3d vector.
#[inline]
pub fn norm_vec3(a: &[f64; 3]) -> f64 {
    dot_product3(a, a).sqrt()
}

/// Return the vector scaled to unit length.
///
/// A zero vector is divided by zero and yields NaN components, which callers
/// propagate like any other floating point result.
#[inline]
pub fn normalize_vec3(a: &[f64; 3]) -> [f64; 3] {
    scale_vec3(a, 1.0 / norm_vec3(a))
}

/// Multiply two 3x3 row-major matrices.
pub fn matmul33(a: &[[f64; 3]; 3], b: &[[f64; 3]; 3]) -> [[f64; 3]; 3] {
    let mut m = [[0.0; 3]; 3];
    for (i, row) in m.iter_mut().enumerate() {
        for (j, val) in row.iter_mut().enumerate() {
            *val = a[i][0] * b[0][j] + a[i][1] * b[1][j] + a[i][2] * b[2][j];
        }
    }
    m
}

/// Multiply a 3x3 row-major matrix by a 3d vector.
#[inline]
pub fn mat33_mul_vec3(m: &[[f64; 3]; 3], v: &[f64; 3]) -> [f64; 3] {
    [
        dot_product3(&m[0], v),
        dot_product3(&m[1], v),
        dot_product3(&m[2], v),
    ]
}

/// Apply the affine map `q = M p + t` to every point.
///
/// `matrix` need not be a rotation; the map is evaluated as a single faer
/// product of `matrix` with the 3xN view of `input`.
///
/// # Arguments
///
/// * `input` - Points to map.
/// * `matrix` - Row-major 3x3 linear part.
/// * `translation` - Translation added after the linear part.
/// * `output` - Destination, same length as `input`.
///
/// Example:
///
/// ```
/// use handgeo_3d::linalg::transform_points;
///
/// let input = [[1.0, 0.0, 0.0], [0.0, 2.0, 0.0]];
/// let swap_xy = [[0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]];
/// let mut output = [[0.0; 3]; 2];
/// transform_points(&input, &swap_xy, &[0.0, 0.0, 1.0], &mut output);
/// assert_eq!(output, [[0.0, 1.0, 1.0], [2.0, 0.0, 1.0]]);
/// ```
pub fn transform_points(
    input: &[[f64; 3]],
    matrix: &[[f64; 3]; 3],
    translation: &[f64; 3],
    output: &mut [[f64; 3]],
) {
    assert_eq!(input.len(), output.len(), "input and output lengths differ");

    let lhs = utils::mat33_view(matrix);
    let rhs = utils::points_to_faer_mat(input).transpose();
    let mut out = utils::points_to_faer_mat_mut(output);

    faer::linalg::matmul::matmul(&mut out, lhs, rhs, None, 1.0, faer::Parallelism::None);

    for mut point in out.col_iter_mut() {
        for (k, t) in translation.iter().enumerate() {
            point.write(k, point.read(k) + t);
        }
    }
}

/// Rotation matrix about the x axis by `angle` radians.
pub fn rotation_x(angle: f64) -> [[f64; 3]; 3] {
    let (s, c) = angle.sin_cos();
    [[1.0, 0.0, 0.0], [0.0, c, -s], [0.0, s, c]]
}

/// Rotation matrix about the y axis by `angle` radians.
pub fn rotation_y(angle: f64) -> [[f64; 3]; 3] {
    let (s, c) = angle.sin_cos();
    [[c, 0.0, s], [0.0, 1.0, 0.0], [-s, 0.0, c]]
}

/// Rotation matrix about the z axis by `angle` radians.
pub fn rotation_z(angle: f64) -> [[f64; 3]; 3] {
    let (s, c) = angle.sin_cos();
    [[c, -s, 0.0], [s, c, 0.0], [0.0, 0.0, 1.0]]
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_cross_and_dot() {
        let a = [1.0, 2.0, 3.0];
        let b = [4.0, 5.0, 6.0];
        let c = cross_vec3(&a, &b);
        assert_eq!(c, [-3.0, 6.0, -3.0]);
        assert_eq!(dot_product3(&c, &a), 0.0);
        assert_eq!(dot_product3(&c, &b), 0.0);
    }

    #[test]
    fn test_normalize_zero_is_nan() {
        let n = normalize_vec3(&[0.0, 0.0, 0.0]);
        assert!(n.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_transform_points_scale_and_shift() {
        let input = vec![[1.0, -1.0, 0.5], [0.0, 0.0, 0.0]];
        let matrix = [[2.0, 0.0, 0.0], [0.0, 3.0, 0.0], [0.0, 0.0, -1.0]];
        let mut output = vec![[0.0; 3]; 2];
        transform_points(&input, &matrix, &[0.5, 0.0, 1.0], &mut output);
        assert_eq!(output, vec![[2.5, -3.0, 0.5], [0.5, 0.0, 1.0]]);
    }

    #[test]
    fn test_transform_points_inverse() {
        let input = vec![[0.3, -1.2, 2.0], [4.0, 0.1, -0.6], [-2.0, 2.0, 2.0]];
        let rotation = matmul33(&rotation_x(0.8), &rotation_z(-1.1));
        let shift = [0.25, -0.5, 3.0];

        let mut moved = vec![[0.0; 3]; input.len()];
        transform_points(&input, &rotation, &shift, &mut moved);

        // inverse of (R, t) is (R^T, -R^T t)
        let inverse = [
            [rotation[0][0], rotation[1][0], rotation[2][0]],
            [rotation[0][1], rotation[1][1], rotation[2][1]],
            [rotation[0][2], rotation[1][2], rotation[2][2]],
        ];
        let back_shift = scale_vec3(&mat33_mul_vec3(&inverse, &shift), -1.0);
        let mut back = vec![[0.0; 3]; input.len()];
        transform_points(&moved, &inverse, &back_shift, &mut back);

        for (p, q) in back.iter().zip(&input) {
            for k in 0..3 {
                assert_relative_eq!(p[k], q[k], epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_rotations_compose() {
        let r = matmul33(&rotation_z(0.3), &rotation_z(-0.3));
        for (i, row) in r.iter().enumerate() {
            for (j, val) in row.iter().enumerate() {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_relative_eq!(*val, expected, epsilon = 1e-12);
            }
        }
        let v = mat33_mul_vec3(&rotation_y(std::f64::consts::FRAC_PI_2), &[1.0, 0.0, 0.0]);
        assert_relative_eq!(v[2], -1.0, epsilon = 1e-12);
    }
}
