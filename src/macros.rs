// Emite una línea con la indentación actual del emisor. Sin formato,
// emite una línea vacía.
macro_rules! emit {
    ($emitter:expr) => {
        writeln!($emitter.output())
    };

    ($emitter:expr, $($format:tt)*) => {{
        $emitter.indent()?;
        writeln!($emitter.output(), $($format)*)
    }};
}
