//! ember-vm — interpréteur de bytecode Ember
//!
//! La VM possède les chunks qu'on lui confie (`interpret` en prend la
//! propriété), une pile d'opérandes et un pointeur d'instruction. L'exécution
//! est synchrone : `interpret` rend la main une fois `RETURN` atteint ou sur
//! la première erreur.
//!
//! - `Vm`        : boucle fetch/decode/execute
//! - `VmConfig`  : trace d'exécution, limite de pile
//! - `VmError`   : erreurs d'exécution, toujours avec l'offset fautif
//! - `Captured`  : sortie capturable (tests, embarqué)
//!
//! Les valeurs rendues par `RETURN` et les traces sont écrites sur un sink
//! explicite (`io::Write`), jamais sur un état global.

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms, unused_must_use, missing_docs)]

mod error;
mod output;
mod vm;

pub use error::{VmError, VmResult};
pub use output::Captured;
pub use vm::{Snapshot, Vm, VmConfig, VmState};

pub use ember_core::{Chunk, Opcode, Value};

/// Prelude pratique pour importer d'un coup.
pub mod prelude {
    pub use crate::{Captured, Chunk, Opcode, Snapshot, Value, Vm, VmConfig, VmError, VmResult, VmState};
}
