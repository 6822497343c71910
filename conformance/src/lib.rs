//! Tipos generados a partir de las especificaciones en `idl/`.
//!
//! Este crate no tiene lógica propia: sus pruebas verifican que el código
//! emitido compila y que respeta el formato de cable y la forma
//! estructural.

#[allow(
    non_camel_case_types,
    non_snake_case,
    non_upper_case_globals,
    dead_code,
    clippy::all
)]
pub mod scenarios {
    include!(concat!(env!("OUT_DIR"), "/scenarios.rs"));
}

#[allow(
    non_camel_case_types,
    non_snake_case,
    non_upper_case_globals,
    dead_code,
    clippy::all
)]
pub mod shapes {
    include!(concat!(env!("OUT_DIR"), "/shapes.rs"));
}
