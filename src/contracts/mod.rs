//! StudyEscrow / StudyRegistry contract layer
//!
//! ABI fragments, step inputs, the transaction builder, and the receipt
//! extractor.

pub mod abi;
pub mod builder;
pub mod extractor;
pub mod inputs;
pub mod registry;

pub use builder::{BuildError, NamedArg, TransactionBuilder, UnsignedTransaction};
pub use extractor::{extract_step_id, ExtractedId, ExtractionError};
pub use inputs::{
    CriteriaInput, EscrowInput, MilestoneInput, MilestoneKind, MilestonesInput, PriorIds,
    RegistryInput, StepInput, ValidationError,
};
pub use registry::{ConfigurationError, ContractKind, ContractRegistry, DeployedContract};
