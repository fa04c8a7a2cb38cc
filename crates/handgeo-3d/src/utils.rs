/// View a slice of 3d points as an Nx3 faer matrix, one row per point.
pub fn points_to_faer_mat(points: &[[f64; 3]]) -> faer::MatRef<'_, f64> {
    // SAFETY: [[f64; 3]] is laid out as 3 * len contiguous f64 values
    let flat = unsafe { std::slice::from_raw_parts(points.as_ptr() as *const f64, points.len() * 3) };
    faer::mat::from_row_major_slice(flat, points.len(), 3)
}

/// View a mutable slice of 3d points as a 3xN faer matrix, one column per point.
pub fn points_to_faer_mat_mut(points: &mut [[f64; 3]]) -> faer::MatMut<'_, f64> {
    // SAFETY: [[f64; 3]] is laid out as 3 * len contiguous f64 values
    let flat = unsafe {
        std::slice::from_raw_parts_mut(points.as_mut_ptr() as *mut f64, points.len() * 3)
    };
    faer::mat::from_column_major_slice_mut(flat, 3, points.len())
}

/// View a row-major 3x3 array as a faer matrix.
pub fn mat33_view(m: &[[f64; 3]; 3]) -> faer::MatRef<'_, f64> {
    // SAFETY: [[f64; 3]; 3] is 9 contiguous f64 values
    let flat = unsafe { std::slice::from_raw_parts(m.as_ptr() as *const f64, 9) };
    faer::mat::from_row_major_slice(flat, 3, 3)
}
