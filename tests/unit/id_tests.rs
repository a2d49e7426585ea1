use std::io::Cursor;

use proptest::prelude::*;
use wcadm::id::{
    self, compare, decode_part, equal, parse, related, unparse, unparse_part, IdParseError, IdPart,
    IdRelation, Location, NodeId, TxnId,
};

#[test]
fn parses_committed_id() -> wcadm::Result<()> {
    let node = parse("1.0.r3/10")?;
    assert_eq!(*node.node_id(), IdPart::new(0, 1));
    assert!(node.copy_id().is_root());
    assert_eq!(node.revision(), Some(3));
    assert_eq!(node.item(), 10);
    assert_eq!(node.txn_id(), None);
    assert!(!node.is_txn());
    assert_eq!(unparse(&node), "1.0.r3/10");
    Ok(())
}

#[test]
fn parses_txn_id() -> wcadm::Result<()> {
    let node = parse("_a.0.tMYTXN")?;
    assert_eq!(*node.node_id(), IdPart::in_txn(10));
    assert_eq!(node.txn_id(), Some("MYTXN"));
    assert_eq!(node.revision(), None);
    assert_eq!(node.item(), 0);
    assert!(node.is_txn());
    assert_eq!(node.to_string(), "_a.0.tMYTXN");
    Ok(())
}

#[test]
fn parses_part_with_revision() -> wcadm::Result<()> {
    let node: NodeId = "z-7.2s-12.r99/4".parse()?;
    assert_eq!(*node.node_id(), IdPart::new(7, 35));
    assert_eq!(*node.copy_id(), IdPart::new(12, 100));
    assert_eq!(unparse(&node), "z-7.2s-12.r99/4");
    Ok(())
}

#[test]
fn rejects_malformed_ids() {
    let cases = [
        "",
        "1.0",
        "1.0.r3/10.x",
        "1.0.x3",
        "1.0.r3",
        "1.0.r3/",
        "1.0.r/10",
        "1.0.r3/10/2",
        "1.0.r-3/10",
        "1.0.t",
        "0.0.t",
        "A.0.r1/1",
        "1x.0.r1/1",
        "1-.0.r1/1",
        "_.0.tX",
        "_1-2.0.tX",
        "zzzzzzzzzzzzzz.0.r1/1",
        ".0.r1/1",
    ];
    for case in cases {
        assert!(parse(case).is_err(), "'{case}' should not parse");
    }
}

#[test]
fn empty_txn_id_is_rejected() {
    assert_eq!(
        parse("0.0.t").unwrap_err(),
        IdParseError::BadTxnId(String::new())
    );
}

#[test]
fn malformed_id_reports_field_count() {
    assert_eq!(
        parse("1.0").unwrap_err(),
        IdParseError::FieldCount("1.0".to_string())
    );
}

#[test]
fn malformed_id_converts_into_crate_error() {
    let err: anyhow::Error = wcadm::Error::from(parse("nope").unwrap_err()).into();
    assert!(matches!(
        wcadm::Error::of(&err),
        Some(wcadm::Error::MalformedId(_))
    ));
}

#[test]
fn txn_ids_reject_dots_and_empty() {
    assert!(TxnId::new("").is_err());
    assert!(TxnId::new("a.b").is_err());
    assert_eq!(TxnId::new("4-1").unwrap().as_str(), "4-1");
}

#[test]
fn relation_of_committed_ids() -> wcadm::Result<()> {
    let a = parse("1.0.r3/10")?;
    let b = parse("1.0.r5/2")?;
    let c = parse("2.0.r3/10")?;

    assert!(equal(&a, &a.clone()));
    assert_eq!(compare(&a, &a), IdRelation::Equal);
    assert!(related(&a, &b));
    assert_eq!(compare(&a, &b), IdRelation::Related);
    assert!(!related(&a, &c));
    assert_eq!(compare(&a, &c), IdRelation::Unrelated);
    Ok(())
}

#[test]
fn txn_parts_from_different_txns_are_unrelated() -> wcadm::Result<()> {
    let a = parse("_1.0.tT1")?;
    let b = parse("_1.0.tT2")?;
    let c = parse("_1.0.tT1")?;

    assert!(!related(&a, &b));
    assert_eq!(compare(&a, &c), IdRelation::Equal);
    Ok(())
}

#[test]
fn committed_node_related_across_txns() -> wcadm::Result<()> {
    let a = parse("4.0.tT1")?;
    let b = parse("4.0.tT2")?;
    assert!(related(&a, &b));
    Ok(())
}

#[test]
fn txn_root_is_root_parts_in_txn() {
    let txn = TxnId::new("7-2").unwrap();
    let node = NodeId::txn_root(txn.clone());
    assert!(node.node_id().is_root());
    assert!(node.copy_id().is_root());
    assert_eq!(*node.location(), Location::Transaction(txn));
    assert_eq!(unparse(&node), "0.0.t7-2");
}

#[test]
fn binary_transport_keeps_location_variant() -> wcadm::Result<()> {
    let committed = parse("1.0.r3/10")?;
    let txn = parse("_a.0.tMYTXN")?;

    for node in [committed, txn] {
        let mut buf = Vec::new();
        id::serialize(Some(&node), &mut buf)?;
        let back = id::deserialize(Cursor::new(buf))?;
        assert_eq!(back, Some(node));
    }
    Ok(())
}

#[test]
fn binary_transport_absent_id_is_one_byte() -> wcadm::Result<()> {
    let mut buf = Vec::new();
    id::serialize(None, &mut buf)?;
    assert_eq!(buf.len(), 1);
    assert_eq!(id::deserialize(Cursor::new(buf))?, None);
    Ok(())
}

#[test]
fn binary_transport_rejects_truncated_input() {
    let mut buf = Vec::new();
    id::serialize(Some(&parse("1.0.r3/10").unwrap()), &mut buf).unwrap();
    buf.truncate(buf.len() / 2);
    assert!(id::deserialize(Cursor::new(buf)).is_err());
}

fn part_strategy() -> impl Strategy<Value = IdPart> {
    prop_oneof![
        any::<u64>().prop_map(IdPart::in_txn),
        (any::<u64>(), any::<u64>()).prop_map(|(rev, num)| IdPart::new(rev, num)),
    ]
}

fn node_strategy() -> impl Strategy<Value = NodeId> {
    let txn = "[A-Za-z0-9_-]{1,12}".prop_map(|t| TxnId::new(t).unwrap());
    prop_oneof![
        (part_strategy(), part_strategy(), txn).prop_map(|(n, c, t)| NodeId::in_txn(n, c, t)),
        (part_strategy(), part_strategy(), any::<u64>(), any::<u64>())
            .prop_map(|(n, c, rev, item)| NodeId::committed(n, c, rev, item)),
    ]
}

proptest! {
    #[test]
    fn text_form_round_trips(node in node_strategy()) {
        let text = unparse(&node);
        prop_assert_eq!(parse(&text).unwrap(), node);
    }

    #[test]
    fn part_form_round_trips(part in part_strategy()) {
        prop_assert_eq!(decode_part(&unparse_part(&part)).unwrap(), part);
    }

    #[test]
    fn base36_round_trips(value in any::<u64>()) {
        prop_assert_eq!(id::from_base36(&id::to_base36(value)).unwrap(), value);
    }

    #[test]
    fn relation_is_reflexive(node in node_strategy()) {
        prop_assert_eq!(compare(&node, &node), IdRelation::Equal);
    }
}
