//! Collective algorithms: the communication façade, the ownership vote and
//! the reductions built on it.

pub mod communicator;
pub mod reduction;
pub mod slave_dofs;
pub mod wire;

pub use communicator::{
    Collective, CommDataHandle, CommunicationChannel, Interface, MessageBuffer, SerialChannel,
    ThreadChannel, ThreadWorld,
};
#[cfg(feature = "mpi-support")]
pub use communicator::MpiChannel;
pub use reduction::ParallelReduction;
pub use slave_dofs::{RegistryState, SlaveDofRegistry};
