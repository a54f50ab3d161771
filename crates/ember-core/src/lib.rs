//! ember-core — primitives partagées de la VM Ember
//!
//! Fournit :
//! - `Value` : donnée d'exécution (`Int(i64)` ou `Unit`)
//! - `Opcode` : jeu d'instructions fermé + table d'arité unique
//! - `Chunk` : code octet + pool de constantes (+ conteneur binaire CRC32)
//! - `disasm` : désassembleur textuel (`=== name ===`, offsets sur 8 chiffres)
//! - `asm` : assembleur texte minimal pour produire des chunks
//! - `helpers` : validation structurelle d'un chunk
//!
//! Features :
//! - `serde` (par défaut) : derive (dé)sérialisation sur `Value`, `Opcode`, `Chunk`

#![deny(missing_docs)]

/* ─────────────────────────── Modules publics ─────────────────────────── */

/// Primitives de bytecode (valeurs, opcodes, chunk, assembleur, désassembleur).
pub mod bytecode;

/// Raccourci : validation structurelle.
pub use bytecode::helpers;
/// Raccourci : désassembleur textuel.
pub use bytecode::disasm;
/// Raccourci : assembleur minimal.
pub use bytecode::asm;

pub use bytecode::{AsmError, AsmErrorKind, Chunk, ChunkError, Instruction, Opcode, Value, MAX_CONSTANTS};

/* ─────────────────────────── Résultat commun ─────────────────────────── */

/// Alias résultat pour les opérations sur les chunks.
pub type ChunkResult<T> = core::result::Result<T, ChunkError>;

/* ─────────────────────────── Prélude ─────────────────────────── */

/// Prélude pratique pour importer les types/funcs clés du crate.
pub mod prelude {
    /// Réexports utiles pour une importation rapide.
    pub use super::{
        asm::assemble,
        disasm::{disassemble_chunk, disassemble_instruction},
        helpers::validate_chunk,
        AsmError, Chunk, ChunkError, ChunkResult, Instruction, Opcode, Value,
    };
}
