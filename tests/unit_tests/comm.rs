use mpfe::comm::{
    all_gather_array, all_gather_pod, max_all_usize, sum_all, sum_all_usize, ChannelCommunicator, Communicator,
    SerialCommunicator,
};
use mpfe::linalg::{DistributedVector, DofRowMap};
use mpfe::nalgebra::DVector;
use mpfe::Error;
use std::sync::Arc;
use util::assert_panics;

#[test]
fn serial_collectives_are_identities() {
    let comm = SerialCommunicator::shared();
    assert_eq!(comm.rank(), 0);
    assert_eq!(comm.size(), 1);
    assert_eq!(sum_all(comm.as_ref(), 2.5).unwrap(), 2.5);
    assert_eq!(max_all_usize(comm.as_ref(), 7).unwrap(), 7);
    assert_eq!(all_gather_pod(comm.as_ref(), 3usize).unwrap(), vec![3]);
    assert_eq!(all_gather_array(comm.as_ref(), &[1.0, 2.0]).unwrap(), vec![vec![1.0, 2.0]]);
}

#[test]
fn serial_rejects_wrong_number_of_buffers() {
    let comm = SerialCommunicator::new();
    let result = comm.all_to_all(vec![Vec::new(), Vec::new()]);
    assert!(matches!(result, Err(Error::Communication(_))));
}

#[test]
fn channel_gathers_are_indexed_by_rank() {
    let results = ChannelCommunicator::run(3, |comm| {
        let rank = comm.rank();
        let pods = all_gather_pod(comm.as_ref(), 10 * rank).unwrap();
        // Rank r contributes r entries
        let values: Vec<usize> = (0..rank).collect();
        let arrays = all_gather_array(comm.as_ref(), &values).unwrap();
        (pods, arrays)
    });
    for (pods, arrays) in results {
        assert_eq!(pods, vec![0, 10, 20]);
        assert_eq!(arrays, vec![vec![], vec![0], vec![0, 1]]);
    }
}

#[test]
fn channel_reductions_agree_on_all_ranks() {
    let results = ChannelCommunicator::run(4, |comm| {
        let rank = comm.rank();
        let sum = sum_all(comm.as_ref(), 0.1 * rank as f64).unwrap();
        let count = sum_all_usize(comm.as_ref(), rank + 1).unwrap();
        let max = max_all_usize(comm.as_ref(), 3 * rank).unwrap();
        (sum, count, max)
    });
    let (sum, count, max) = results[0];
    assert!((sum - 0.6).abs() < 1e-14);
    assert_eq!(count, 10);
    assert_eq!(max, 9);
    // Summation in rank order gives bitwise identical results
    for result in &results {
        assert_eq!(result.0.to_bits(), sum.to_bits());
        assert_eq!((result.1, result.2), (count, max));
    }
}

#[test]
fn channel_all_to_all_delivers_personalized_buffers() {
    let results = ChannelCommunicator::run(3, |comm| {
        let rank = comm.rank() as u8;
        let send = (0..comm.size() as u8).map(|target| vec![rank, target]).collect();
        comm.all_to_all(send).unwrap()
    });
    for (rank, received) in results.into_iter().enumerate() {
        let expected: Vec<Vec<u8>> = (0..3u8).map(|source| vec![source, rank as u8]).collect();
        assert_eq!(received, expected);
    }
}

#[test]
fn channel_collectives_stay_ordered_under_skew() {
    // Ranks run ahead of each other; every collective must still pair up with its own round
    let results = ChannelCommunicator::run(3, |comm| {
        let rank = comm.rank();
        let mut sums = Vec::new();
        for round in 0..50 {
            if rank == round % 3 {
                std::thread::yield_now();
            }
            sums.push(sum_all_usize(comm.as_ref(), round * (rank + 1)).unwrap());
        }
        sums
    });
    let expected: Vec<usize> = (0..50).map(|round| 6 * round).collect();
    for sums in results {
        assert_eq!(sums, expected);
    }
}

#[test]
fn channel_barrier_completes() {
    let results = ChannelCommunicator::run(2, |comm| comm.barrier().is_ok());
    assert_eq!(results, vec![true, true]);
}

#[test]
fn gathered_vectors_stack_the_owned_blocks() {
    let results = ChannelCommunicator::run(2, |comm| {
        let map = Arc::new(DofRowMap::from_counts(&[2, 3], comm.rank()));
        let owned = DVector::from_fn(map.num_owned(), |i, _| (10 * comm.rank() + i) as f64);
        let vector = DistributedVector::from_owned(map, owned.clone());
        (owned, vector.gather_global(comm.as_ref()).unwrap())
    });
    let blocks: Vec<DVector<f64>> = results.iter().map(|(owned, _)| owned.clone()).collect();
    let stacked = DVector::from_iterator(5, blocks.iter().flat_map(|block| block.iter().copied()));
    assert_eq!(stacked.as_slice(), &[0.0, 1.0, 10.0, 11.0, 12.0]);
    for (_, global) in &results {
        assert_eq!(global, &stacked);
    }
}

#[test]
fn channel_communicators_need_a_rank() {
    assert_panics!(ChannelCommunicator::create(0));
}
