use fenris_nonlinear::partition::BlockPartition;
use fenris_nonlinear::proptest::block_partition;
use proptest::collection::vec;
use proptest::prelude::*;
use util::assert_panics;

#[test]
fn partition_from_block_sizes() {
    let partition = BlockPartition::from_block_sizes([3, 0, 2]);
    assert_eq!(partition.offsets(), &[0, 3, 3, 5]);
    assert_eq!(partition.num_blocks(), 3);
    assert_eq!(partition.total_size(), 5);
    assert_eq!(partition.block_range(2), 3..5);
    assert_eq!(partition.block_sizes().collect::<Vec<_>>(), vec![3, 0, 2]);
}

#[test]
fn find_block_skips_empty_blocks() {
    let partition = BlockPartition::from_block_sizes([3, 0, 2]);
    assert_eq!(partition.find_block(0), Some((0, 0)));
    assert_eq!(partition.find_block(2), Some((0, 2)));
    assert_eq!(partition.find_block(3), Some((2, 0)));
    assert_eq!(partition.find_block(4), Some((2, 1)));
    assert_eq!(partition.find_block(5), None);
}

#[test]
fn deserialized_partition_is_validated() {
    let partition: BlockPartition = serde_json::from_str(r#"{"offsets":[0,3,3,5]}"#).unwrap();
    assert_eq!(partition, BlockPartition::from_block_sizes([3, 0, 2]));

    assert!(serde_json::from_str::<BlockPartition>(r#"{"offsets":[0,5,3]}"#).is_err());
    assert!(serde_json::from_str::<BlockPartition>(r#"{"offsets":[1,5]}"#).is_err());
    assert!(serde_json::from_str::<BlockPartition>(r#"{"offsets":[]}"#).is_err());
}

#[test]
fn serialized_partition_deserializes_to_itself() {
    let partition = BlockPartition::from_block_sizes([2, 0, 4]);
    let json = serde_json::to_string(&partition).unwrap();
    assert_eq!(serde_json::from_str::<BlockPartition>(&json).unwrap(), partition);
}

#[test]
fn empty_partition() {
    let partition = BlockPartition::from_block_sizes(Vec::new());
    assert_eq!(partition.num_blocks(), 0);
    assert_eq!(partition.total_size(), 0);
    assert_eq!(partition.find_block(0), None);
}

#[test]
fn invalid_offsets_panic() {
    assert_panics!(BlockPartition::from_offsets(vec![1, 2]));
    assert_panics!(BlockPartition::from_offsets(vec![0, 2, 1]));
    assert_panics!(BlockPartition::from_offsets(vec![]));
}

proptest! {
    #[test]
    fn offsets_are_prefix_sums_of_block_sizes(sizes in vec(0..10usize, 0..6)) {
        let partition = BlockPartition::from_block_sizes(sizes.clone());
        prop_assert_eq!(partition.offsets()[0], 0);
        for (j, &size) in sizes.iter().enumerate() {
            prop_assert_eq!(partition.block_offset(j + 1), partition.block_offset(j) + size);
            prop_assert_eq!(partition.block_size(j), size);
        }
        prop_assert_eq!(partition.total_size(), sizes.iter().sum::<usize>());
        prop_assert_eq!(BlockPartition::from_offsets(partition.offsets().to_vec()), partition);
    }

    #[test]
    fn find_block_inverts_block_offsets(partition in block_partition(5, 4)) {
        for global in 0..partition.total_size() {
            let (block, local) = partition.find_block(global).unwrap();
            prop_assert!(local < partition.block_size(block));
            prop_assert_eq!(partition.block_offset(block) + local, global);
        }
    }
}
