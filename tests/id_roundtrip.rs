use backlog::id::TaskId;
use proptest::prelude::*;

proptest! {
    #[test]
    fn display_then_parse_is_identity(seg in prop::collection::vec(1u32..1000, 1..5)) {
        let id = TaskId::from_segments(seg.clone());
        let text = id.to_string();
        let parsed = TaskId::parse(&text).expect("display output parses");
        prop_assert_eq!(&parsed, &id);
        prop_assert_eq!(TaskId::parse(&id.name()).expect("name parses"), id);
        prop_assert_eq!(parsed.segments(), seg.as_slice());
    }

    #[test]
    fn parent_drops_last_segment(seg in prop::collection::vec(1u32..100, 2..5)) {
        let id = TaskId::from_segments(seg.clone());
        let parent = id.parent().expect("multi-segment ids have a parent");
        prop_assert_eq!(parent.segments(), &seg[..seg.len() - 1]);
        prop_assert!(id.starts_with(parent.segments()));
    }

    #[test]
    fn sibling_sorts_after(seg in prop::collection::vec(1u32..100, 1..4)) {
        let id = TaskId::from_segments(seg);
        prop_assert!(id.next_sibling_id().expect("small segments") > id);
        prop_assert!(id.next_sub_task_id() > id);
    }
}
