//! Browser tests, run with `wasm-pack test --headless --firefox wasm`

#![cfg(target_arch = "wasm32")]

use wasm_bindgen_test::*;
use warehouse_wasm::{calculate_line_totals, movement_type_codes};

wasm_bindgen_test_configure!(run_in_browser);

#[wasm_bindgen_test]
fn test_movement_type_codes() {
    let codes = movement_type_codes();
    assert_eq!(codes.length() as usize, shared::MovementType::ALL.len());
    assert_eq!(codes.get(0).as_string().as_deref(), Some(shared::MovementType::ALL[0].as_str()));
}

#[wasm_bindgen_test]
fn test_line_totals_reject_bad_amounts() {
    assert!(calculate_line_totals(1, "abc", "0", "19").is_err());
    assert!(calculate_line_totals(2, "79228162514264337593543950", "0", "19").is_err());
}
