/*!
 * Pipe Module
 * Factories producing linked connection pairs
 */

pub mod factory;

// Re-export public API
pub use factory::{
    from_config, make_pipe, make_pipe_with, EmulatedPipeFactory, NativePipeFactory, PipeFactory,
};
