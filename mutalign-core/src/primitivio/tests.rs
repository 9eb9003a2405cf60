use super::*;
use crate::align::{align_global, Alignment, Scoring};
use crate::alphabets::nucleotide;
use crate::seq::{Range, Sequence, SequenceQuality, SequenceWithQuality};

#[derive(Default)]
struct Node {
    id: i32,
    name: String,
    children: Vec<Option<Rc<RefCell<Node>>>>,
}

type NodeRef = Rc<RefCell<Node>>;

impl Serializable for Node {
    fn write<W: Write>(&self, out: &mut PrimitivO<W>) -> BioResult<()> {
        out.write_var_i32(self.id)?;
        self.name.write(out)?;
        self.children.write(out)
    }

    fn read<R: Read>(input: &mut PrimitivI<R>) -> BioResult<Self> {
        Ok(Node {
            id: input.read_var_i32()?,
            name: String::read(input)?,
            children: Vec::read(input)?,
        })
    }
}

fn node(id: i32, name: &str, children: Vec<Option<NodeRef>>) -> NodeRef {
    Rc::new(RefCell::new(Node {
        id,
        name: name.to_string(),
        children,
    }))
}

fn child(n: &NodeRef, i: usize) -> Option<NodeRef> {
    n.borrow().children[i].clone()
}

fn same(a: &Option<NodeRef>, b: &Option<NodeRef>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => Rc::ptr_eq(a, b),
        _ => false,
    }
}

/// `root` points at `first` twice, at nothing, at itself and at `shared`, which `first` also
/// points at.
fn graph() -> (NodeRef, NodeRef) {
    let shared = node(2, "DERR", vec![]);
    let first = node(1, "Surep", vec![Some(shared.clone())]);
    let root = node(
        3,
        "Ref",
        vec![Some(first.clone()), Some(first), None, None, Some(shared.clone())],
    );
    root.borrow_mut().children[3] = Some(root.clone());
    (root, shared)
}

fn check_graph(root: &NodeRef) {
    assert_eq!(root.borrow().id, 3);
    assert_eq!(root.borrow().name, "Ref");
    assert!(same(&child(root, 3), &Some(root.clone())));
    assert!(child(root, 2).is_none());
    assert!(same(&child(root, 0), &child(root, 1)));
    let first = child(root, 0).unwrap();
    assert_eq!(first.borrow().name, "Surep");
    assert!(same(&child(&first, 0), &child(root, 4)));
    assert_eq!(child(root, 4).unwrap().borrow().name, "DERR");
}

#[test]
fn plain_values() {
    let mut out = PrimitivO::new(Vec::new());
    for _ in 0..10 {
        out.write_object(&2i32).unwrap();
    }
    let bytes = out.into_inner();
    assert_eq!(bytes.len(), 40);
    let mut input = PrimitivI::new(&bytes[..]);
    for _ in 0..10 {
        assert_eq!(input.read_object::<i32>().unwrap(), 2);
    }
}

#[test]
fn graph_with_cycle_keeps_identity() {
    let (root, _) = graph();
    let mut out = PrimitivO::new(Vec::new());
    for _ in 0..10 {
        out.write_object(&root).unwrap();
    }
    let bytes = out.into_inner();
    let mut input = PrimitivI::new(&bytes[..]);
    let mut previous: Option<NodeRef> = None;
    for _ in 0..10 {
        assert_eq!(input.session_references(), 0);
        let read: NodeRef = input.read_object().unwrap();
        check_graph(&read);
        // Every top-level object is decoded afresh.
        assert!(!same(&previous, &Some(read.clone())));
        previous = Some(read);
    }
}

#[test]
fn known_references_are_shared() {
    let (root, shared) = graph();
    let mut state = PrimitivState::new();
    state.put_known_reference(shared.clone());

    let mut out = PrimitivO::with_state(Vec::new(), state.clone());
    for _ in 0..3 {
        out.write_object(&root).unwrap();
    }
    let bytes = out.into_inner();

    let mut plain = PrimitivO::new(Vec::new());
    for _ in 0..3 {
        plain.write_object(&root).unwrap();
    }
    assert!(bytes.len() < plain.into_inner().len());

    let mut input = PrimitivI::with_state(&bytes[..], state);
    for _ in 0..3 {
        let read: NodeRef = input.read_object().unwrap();
        check_graph(&read);
        assert!(same(&child(&read, 4), &Some(shared.clone())));
    }
}

#[test]
fn known_reference_costs_one_tag() {
    let shared = Arc::new("a shared string".to_string());
    let many = vec![shared.clone(); 100];

    let mut out = PrimitivO::new(Vec::new());
    out.put_known_reference(shared.clone());
    out.write_object(&many).unwrap();
    out.write_object(&many).unwrap();
    let bytes = out.into_inner();
    // One length byte and one tag byte per element, for each of the two writes.
    assert_eq!(bytes.len(), 2 * 101);

    let mut input = PrimitivI::new(&bytes[..]);
    input.put_known_reference(shared.clone());
    let read: Vec<Arc<String>> = input.read_object().unwrap();
    assert_eq!(read.len(), 100);
    assert!(read.iter().all(|s| Arc::ptr_eq(s, &shared)));

    // Without the known reference the body is written once per top-level object.
    let bytes = to_bytes(&many).unwrap();
    assert_eq!(bytes.len(), 1 + 1 + 1 + shared.len() + 99);
    let read: Vec<Arc<String>> = from_bytes(&bytes).unwrap();
    assert!(Arc::ptr_eq(&read[0], &read[99]));
    assert_eq!(*read[0], *shared);
}

#[test]
fn null_references() {
    let values: Vec<Option<Arc<Sequence>>> =
        vec![None, Some(Arc::new(Sequence::nucleotide("ACGT").unwrap()))];
    let bytes = to_bytes(&values).unwrap();
    assert_eq!(bytes[1], NULL_TAG as u8);
    let read: Vec<Option<Arc<Sequence>>> = from_bytes(&bytes).unwrap();
    assert!(read[0].is_none());
    assert_eq!(read[1].as_deref(), values[1].as_deref());
}

#[test]
fn domain_objects() {
    let scoring = Scoring::nucleotide_blast_affine();
    let alignment = align_global(
        &scoring,
        &Sequence::nucleotide("ATTAGACAGGT").unwrap(),
        &Sequence::nucleotide("ATAGACCAGGT").unwrap(),
    )
    .unwrap();
    let read: Alignment = from_bytes(&to_bytes(&alignment).unwrap()).unwrap();
    assert_eq!(read, alignment);

    for scoring in [
        Scoring::nucleotide_blast_linear(),
        scoring,
        Scoring::quality_aware(nucleotide(), vec![5, -4], -5, 30, 10, -4).unwrap(),
    ] {
        let read: Scoring = from_bytes(&to_bytes(&scoring).unwrap()).unwrap();
        assert_eq!(read, scoring);
    }

    let read_seq = SequenceWithQuality::new(
        Sequence::nucleotide("ACGTN").unwrap(),
        SequenceQuality::new(vec![30, 31, 32, 2, 0]),
    )
    .unwrap();
    let back: SequenceWithQuality = from_bytes(&to_bytes(&read_seq).unwrap()).unwrap();
    assert_eq!(back, read_seq);
}

#[test]
fn corrupt_input_is_reported() {
    let bytes = to_bytes(&"some text".to_string()).unwrap();
    assert!(matches!(
        from_bytes::<String>(&bytes[..4]),
        Err(BioError::Serialization { .. })
    ));
    // Back-reference to an id nobody registered.
    assert!(matches!(
        from_bytes::<Arc<String>>(&[5]),
        Err(BioError::Serialization { .. })
    ));
    assert!(from_bytes::<Arc<String>>(&[NULL_TAG as u8]).is_err());
}

fn varints(values: &[u64]) -> Vec<u8> {
    let mut bytes = Vec::new();
    for &v in values {
        varint::write_u64(&mut bytes, v).unwrap();
    }
    bytes
}

#[test]
fn overflowing_range_is_an_error() {
    let err = from_bytes::<Range>(&varints(&[u64::MAX, 2])).unwrap_err();
    assert!(matches!(err, BioError::Serialization { .. }), "{err}");
    assert_eq!(
        from_bytes::<Range>(&varints(&[3, 4])).unwrap(),
        Range::new(3, 7)
    );
}

#[test]
fn bad_tags_and_flags() {
    // Option flag, boolean byte and reference tag outside their domains.
    assert!(matches!(
        from_bytes::<Option<u32>>(&[2]),
        Err(BioError::Serialization { .. })
    ));
    assert!(matches!(from_bytes::<bool>(&[7]), Err(BioError::Serialization { .. })));
    assert!(matches!(
        from_bytes::<Vec<Arc<String>>>(&varints(&[1, u64::MAX])),
        Err(BioError::Serialization { .. })
    ));
    // Ten continuation bytes cannot be a 64-bit varint.
    assert!(matches!(
        from_bytes::<usize>(&[0xFF; 11]),
        Err(BioError::Serialization { .. })
    ));
    assert!(from_bytes::<Scoring>(&[9]).is_err());
}

#[test]
fn corrupt_domain_objects() {
    let alignment = align_global(
        &Scoring::nucleotide_blast_linear(),
        &Sequence::nucleotide("ATTAGACA").unwrap(),
        &Sequence::nucleotide("ATTGACA").unwrap(),
    )
    .unwrap();
    let bytes = to_bytes(&alignment).unwrap();
    for cut in [0, 3, bytes.len() / 2, bytes.len() - 1] {
        assert!(from_bytes::<Alignment>(&bytes[..cut]).is_err(), "cut at {cut}");
    }

    // Unknown alphabet name.
    let mut bytes = to_bytes(&Sequence::nucleotide("ACGT").unwrap()).unwrap();
    bytes[1] = b'X';
    assert!(matches!(
        from_bytes::<Sequence>(&bytes),
        Err(BioError::UnknownAlphabet(_))
    ));

    // Range that reaches past the aligned sequence.
    let mut out = PrimitivO::new(Vec::new());
    let sequence = Sequence::nucleotide("ACGT").unwrap();
    sequence.write(&mut out).unwrap();
    crate::mutations::Mutations::empty(nucleotide()).write(&mut out).unwrap();
    Range::new(0, 9).write(&mut out).unwrap();
    Range::new(0, 9).write(&mut out).unwrap();
    out.write_f32(0.0).unwrap();
    assert!(from_bytes::<Alignment>(&out.into_inner()).is_err());
}
