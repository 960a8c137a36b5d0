/// Truncates a float to `$decimals` places. Used throughout for USD/price
/// values in logs and tests so output doesn't drown in float noise.
#[macro_export]
macro_rules! trunc {
  ($num:expr, $decimals:expr) => {{
    let factor = 10.0_f64.powi($decimals);
    ($num * factor).round() / factor
  }};
}
