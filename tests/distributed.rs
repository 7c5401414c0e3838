use std::sync::Arc;
use std::thread;
use std::time::Duration;
use amrkit::distributed::Coordinator;
use amrkit::extent::Extent;
use amrkit::ghost::{strip_ghost_layers, BlockDecision, GhostOptions};
use amrkit::message::comm::Communicator;
use amrkit::message::local::ChannelCommunicator;
use amrkit::source::PartitionedUniform;
use amrkit::Error;




fn run<F, T>(size: usize, f: F) -> Vec<T>
where
    F: Fn(Coordinator<ChannelCommunicator>, usize, usize) -> T + Send + Sync + 'static,
    T: Send + 'static,
{
    let f = Arc::new(f);
    let procs: Vec<_> = ChannelCommunicator::group(size)
        .into_iter()
        .map(|comm| {
            let f = f.clone();
            thread::spawn(move || {
                let (rank, size) = (comm.rank(), comm.size());
                f(Coordinator::new(comm), rank, size)
            })
        })
        .collect();
    procs.into_iter().map(|p| p.join().unwrap()).collect()
}

fn uniform(partitions: usize, ghost_layers: usize) -> PartitionedUniform {
    PartitionedUniform {
        global_extent: Extent::new([0, 16, 0, 16, 0, 0]).unwrap(),
        origin: [0.0; 3],
        spacing: [1.0 / 16.0; 3],
        partitions,
        ghost_layers,
    }
}




#[test]
fn every_rank_sees_the_same_owner_map() {
    let source = uniform(4, 1);
    let maps = run(2, move |coordinator, rank, size| {
        coordinator.initialize().unwrap();
        let amr = source.generate(rank, size).unwrap();
        coordinator.distribute_process_information(&amr).unwrap()
    });
    assert_eq!(maps[0], maps[1]);
    assert_eq!(maps[0].as_slice(), &[Some(0), Some(0), Some(1), Some(1)]);
    assert_eq!(maps[1].blocks_owned_by(1), vec![2, 3]);
}

#[test]
fn rank_holding_no_blocks_takes_part() {
    let source = uniform(2, 1);
    let maps = run(3, move |coordinator, rank, size| {
        let amr = source.generate(rank, size).unwrap();
        if rank == 2 {
            assert!(amr.is_empty());
        }
        coordinator.distribute_process_information(&amr).unwrap()
    });
    assert!(maps.iter().all(|m| m.as_slice() == [Some(0), Some(1)]));
}

#[test]
fn distributed_strip_matches_a_single_process() {
    let source = uniform(4, 2);
    let (_, expected) = strip_ghost_layers(&source.generate(0, 1).unwrap(), &GhostOptions::default(), None).unwrap();

    let results = run(2, move |coordinator, rank, size| {
        let amr = source.generate(rank, size).unwrap();
        let (stripped, report) = coordinator.strip_ghost_layers(&amr).unwrap();
        let real: usize = stripped.iter().map(|b| b.grid.num_real_cells()).sum();
        (report.decisions, real)
    });

    let mut decisions: Vec<BlockDecision> = results.iter().flat_map(|(d, _)| d.clone()).collect();
    decisions.sort_by_key(|d| d.composite);
    assert_eq!(decisions, expected.decisions);
    assert_eq!(results.iter().map(|(_, real)| real).sum::<usize>(), 16 * 16);
}

#[test]
fn repeated_distributed_strips_agree() {
    let source = uniform(8, 1);
    let results = run(4, move |coordinator, rank, size| {
        let amr = source.generate(rank, size).unwrap();
        let (_, first) = coordinator.strip_ghost_layers(&amr).unwrap();
        let (_, second) = coordinator.strip_ghost_layers(&amr).unwrap();
        (first.decisions, second.decisions)
    });
    assert!(results.iter().all(|(first, second)| first == second));
}

#[test]
fn distributed_blanking_leaves_each_cell_visible_once() {
    let source = uniform(4, 1);
    let visible = run(2, move |coordinator, rank, size| {
        let mut amr = source.generate(rank, size).unwrap();
        coordinator.blank_cells(&mut amr).unwrap();
        amr.iter().map(|b| b.grid.num_visible_cells()).sum::<usize>()
    });
    assert_eq!(visible.iter().sum::<usize>(), 16 * 16);
}

#[test]
fn hierarchies_of_different_shapes_are_rejected() {
    let errors = run(2, |coordinator, rank, size| {
        let amr = uniform(2 + 2 * rank, 1).generate(rank, size).unwrap();
        coordinator.distribute_process_information(&amr).err()
    });
    assert!(errors.iter().all(|e| matches!(e, Some(Error::OwnerMapMismatch { .. }))));
}

#[test]
fn missing_rank_times_out_instead_of_hanging() {
    let mut group = ChannelCommunicator::group(2);
    let _absent = group.pop().unwrap();
    let comm = group.pop().unwrap().with_timeout(Duration::from_millis(20));
    let coordinator = Coordinator::new(comm);
    assert!(matches!(coordinator.initialize(), Err(Error::CollectiveTimeout(_))));
}
