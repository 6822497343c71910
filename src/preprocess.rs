//! Preprocesamiento externo.
//!
//! Las especificaciones suelen depender de `#include` y `#define`. Cuando
//! se solicita, el texto fuente se filtra por un preprocesador externo
//! (por defecto `cpp -P`) y su salida reemplaza por completo la entrada
//! del lexer. El subproceso vive únicamente durante [`Preprocessor::run()`].

use std::{
    io::{self, Write},
    process::{Command, ExitStatus, Stdio},
    thread,
};

use thiserror::Error;

use crate::symbol::Define;

/// Un error de preprocesamiento.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum PreprocessError {
    /// Ocurrió un evento de error de E/S durante la invocación.
    #[error("I/O error")]
    Io(#[from] io::Error),

    /// No fue posible conectar la entrada o salida estándar del proceso.
    #[error("Failed to connect to the preprocessor's standard input")]
    Pipe,

    /// El preprocesador inició su ejecución, pero falló.
    #[error("Preprocessor exited with status code {0:?}")]
    Failed(ExitStatus),

    #[error("Preprocessor output is not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Comando de preprocesamiento con sus argumentos.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preprocessor {
    command: String,
    args: Vec<String>,
}

impl Preprocessor {
    pub fn new<S: Into<String>>(command: S) -> Self {
        Preprocessor {
            command: command.into(),
            args: Vec::new(),
        }
    }

    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Reenvía una definición externa como `-DNAME=VALUE`.
    pub fn define(self, define: &Define) -> Self {
        let arg = format!("-D{}={}", define.name, define.value.text());
        self.arg(arg)
    }

    /// Ejecuta el preprocesador sobre un texto fuente.
    ///
    /// La fuente se escribe desde un hilo aparte, de modo que un texto
    /// grande no bloquee la lectura de la salida.
    pub fn run(&self, source: &str) -> Result<String, PreprocessError> {
        tracing::debug!(command = %self.command, args = ?self.args, "preprocessing");

        let mut child = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()?;

        let mut stdin = child.stdin.take().ok_or(PreprocessError::Pipe)?;
        let input = source.to_owned();

        // Al terminar el hilo se cierra stdin, lo cual indica EOF
        let writer = thread::spawn(move || stdin.write_all(input.as_bytes()));

        let output = child.wait_with_output()?;
        let written = writer.join().map_err(|_| PreprocessError::Pipe)?;

        if !output.status.success() {
            return Err(PreprocessError::Failed(output.status));
        }

        written?;
        Ok(String::from_utf8(output.stdout)?)
    }
}

impl Default for Preprocessor {
    fn default() -> Self {
        Preprocessor::new("cpp").arg("-P")
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn output_replaces_input() {
        let text = "const A = 1;\n".repeat(20_000);
        let output = Preprocessor::new("cat").run(&text).unwrap();

        assert_eq!(output, text);
    }

    #[test]
    fn failures_carry_the_exit_status() {
        let result = Preprocessor::new("sh").args(["-c", "exit 3"]).run("");
        match result {
            Err(PreprocessError::Failed(status)) => assert_eq!(status.code(), Some(3)),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn missing_commands_are_io_errors() {
        let result = Preprocessor::new("/nonexistent/preprocessor").run("");
        assert!(matches!(result, Err(PreprocessError::Io(_))));
    }

    #[test]
    fn defines_become_flags() {
        let define: Define = "MAX=10".parse().unwrap();
        let preprocessor = Preprocessor::default().define(&define);

        assert_eq!(preprocessor.args, vec!["-P".to_owned(), "-DMAX=10".to_owned()]);
    }
}
