#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|input: (&str, f64, f64)| {
    let (src, z, bz) = input;
    if let Ok(expr) = shuttle_core::RampExpr::parse(src) {
        let _ = expr.eval(z, bz);
        let _ = expr.primary_variable();
    }
});
