//! Ghost stripping and blanking for hierarchies spread over several
//! processes.
//!
//! Every process holds the complete box metadata but only the payloads of
//! its own blocks. The `Coordinator` gathers which process holds which
//! block into an `OwnerMap` that is identical everywhere, after which the
//! ghost decisions need no further communication.

use log::{info, warn};
use crate::error::{Error, Result};
use crate::ghost::{self, BlankReport, GhostOptions, OwnerMap, StripReport};
use crate::hierarchy::OverlappingAmr;
use crate::message::comm::Communicator;




/**
 * Drives the collective parts of ghost processing over an injected
 * communicator. Every operation that communicates fails with
 * `Error::NoCommunicator` when none has been configured, rather than
 * quietly behaving as a single process.
 */
pub struct Coordinator<C: Communicator> {
    comm: Option<C>,
    options: GhostOptions,
}




// ============================================================================
impl<C: Communicator> Coordinator<C> {

    pub fn new(comm: C) -> Self {
        Self { comm: Some(comm), options: GhostOptions::default() }
    }

    pub fn without_communicator() -> Self {
        Self { comm: None, options: GhostOptions::default() }
    }

    pub fn with_options(mut self, options: GhostOptions) -> Self {
        self.options = options;
        self
    }

    pub fn set_communicator(&mut self, comm: C) {
        self.comm = Some(comm);
    }

    pub fn options(&self) -> &GhostOptions {
        &self.options
    }

    pub fn communicator(&self) -> Result<&C> {
        self.comm.as_ref().ok_or(Error::NoCommunicator)
    }

    pub fn rank(&self) -> Result<usize> {
        Ok(self.communicator()?.rank())
    }


    /**
     * Check that a communicator is configured and synchronize with the
     * rest of the group.
     */
    pub fn initialize(&self) -> Result<()> {
        let comm = self.communicator()?;
        comm.barrier()?;
        info!("coordinator ready on rank {} of {}", comm.rank(), comm.size());
        Ok(())
    }


    pub fn barrier(&self) -> Result<()> {
        self.communicator()?.barrier()
    }


    /**
     * Gather, from every process, the composite indexes of the blocks it
     * holds, and merge them into an owner map. Every process must call this
     * with hierarchies of the same shape; a process holding no blocks is
     * fine. If two processes claim the same block, the lower rank keeps it.
     */
    pub fn distribute_process_information(&self, amr: &OverlappingAmr) -> Result<OwnerMap> {
        let comm = self.communicator()?;
        let held: Vec<usize> = amr.iter().map(|block| block.composite).collect();
        let message = rmp_serde::encode::to_vec(&(amr.total_blocks(), held))?;
        let mut owners = OwnerMap::new(amr.total_blocks());

        for (rank, message) in comm.all_gather(message)?.iter().enumerate() {
            let (total_blocks, held): (usize, Vec<usize>) = rmp_serde::decode::from_slice(message)?;

            if total_blocks != amr.total_blocks() {
                return Err(Error::OwnerMapMismatch { len: total_blocks, expected: amr.total_blocks() });
            }
            for composite in held {
                match owners.owner(composite) {
                    Some(owner) => warn!("block {} is held by ranks {} and {}, keeping {}", composite, owner, rank, owner),
                    None => owners.set_owner(composite, rank)?,
                }
            }
        }
        info!(
            "rank {} holds {} of {} blocks",
            comm.rank(),
            owners.blocks_owned_by(comm.rank()).len(),
            owners.as_slice().iter().filter(|o| o.is_some()).count());

        Ok(owners)
    }


    /**
     * Strip ghost layers from this process's blocks, resolving ownership
     * against the blocks held on every process. Collective.
     */
    pub fn strip_ghost_layers(&self, amr: &OverlappingAmr) -> Result<(OverlappingAmr, StripReport)> {
        self.barrier()?;
        let owners = self.distribute_process_information(amr)?;
        ghost::strip_ghost_layers(amr, &self.options, Some(&owners))
    }


    /**
     * Blank the cells of this process's blocks that are owned elsewhere,
     * whether on this process or another. Collective.
     */
    pub fn blank_cells(&self, amr: &mut OverlappingAmr) -> Result<BlankReport> {
        self.barrier()?;
        let owners = self.distribute_process_information(amr)?;
        ghost::blank_cells(amr, &self.options, Some(&owners))
    }
}




// ============================================================================
#[cfg(test)]
mod test {

    use crate::error::Error;
    use crate::hierarchy::OverlappingAmr;
    use crate::message::local::ChannelCommunicator;
    use super::Coordinator;

    #[test]
    fn collectives_without_a_communicator_fail() {
        let coordinator = Coordinator::<ChannelCommunicator>::without_communicator();
        let amr = OverlappingAmr::with_levels([0.0; 3], [1.0; 3], 2, &[1]).unwrap();

        assert!(matches!(coordinator.initialize(), Err(Error::NoCommunicator)));
        assert!(matches!(coordinator.barrier(), Err(Error::NoCommunicator)));
        assert!(matches!(coordinator.distribute_process_information(&amr), Err(Error::NoCommunicator)));
        assert!(matches!(coordinator.strip_ghost_layers(&amr), Err(Error::NoCommunicator)));
    }

    #[test]
    fn single_process_group_owns_its_blocks() {
        let comm = ChannelCommunicator::group(1).pop().unwrap();
        let mut coordinator = Coordinator::without_communicator();
        coordinator.set_communicator(comm);

        let amr = crate::source::GaussianPulse::default().generate().unwrap();
        let owners = coordinator.distribute_process_information(&amr).unwrap();
        assert_eq!(owners.as_slice(), &[Some(0), Some(0), Some(0)]);
        assert_eq!(coordinator.rank().unwrap(), 0);
    }
}
