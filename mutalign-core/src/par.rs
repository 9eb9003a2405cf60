/// Fallible map over a slice, spread over the rayon pool when the `parallel` feature is on.
///
/// Collects into `Result<Vec<_>, _>`; output keeps the input order either way.
macro_rules! par_try_map {
    ($slice:expr, $f:expr) => {{
        #[cfg(feature = "parallel")]
        {
            use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
            $slice.par_iter().map($f).collect()
        }
        #[cfg(not(feature = "parallel"))]
        {
            $slice.iter().map($f).collect()
        }
    }};
}
