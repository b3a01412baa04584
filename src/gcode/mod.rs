//! G-code front end: the dialect parser, the waveform compiler, the layer
//! mixing utilities, and the exposure test pattern generator.

pub mod compiler;
pub mod exposure;
pub mod instruction;
pub mod mixer;

pub use compiler::{
    compile_file, compile_program, CompileSummary, Compiler, LayerCheckpoint, MachineState,
    DEFAULT_SAMPLE_RATE,
};
pub use exposure::ExposureTest;
pub use instruction::{parse_line, Instruction, Move};
pub use mixer::{scramble_layers, split_layers, Layer, LayerMixer};
