/*!
 * Shared Arena Tests
 * Cell layout, typed access and error reporting
 */

use conduit::ipc::shm::ArenaStats;
use conduit::{CellInit, ConduitError, Scalar, SharedArena, SharedBlock, ShmError, TypeCode};
use pretty_assertions::assert_eq;
use std::thread;

#[test]
fn test_value_then_array_never_alias() {
    let arena = SharedArena::new(4096).unwrap();
    let mut num = arena.value(0.0f64).unwrap();
    let mut arr = arena.array(0..10i32).unwrap();

    num.set(3.1415927);
    for i in 0..10 {
        let current = arr.get(i).unwrap();
        arr.set(i, -current).unwrap();
    }
    for i in 0..10 {
        let current = arr.get(i).unwrap();
        arr.set(i, -current).unwrap();
    }

    assert_eq!(num.get(), 3.1415927);
    assert_eq!(arr.get(1).unwrap(), 1);
    assert_eq!(arr.to_vec(), (0..10).collect::<Vec<i32>>());
    assert!(arr.cell().offset() >= num.cell().offset() + num.cell().byte_len());
}

#[test]
fn test_dynamic_cells_from_typecode_strings() {
    let arena = SharedArena::new(1024).unwrap();
    let code: TypeCode = "d".parse().unwrap();
    let value = arena
        .make_cell(code, CellInit::Value(Scalar::Float(0.25)))
        .unwrap();
    let mut array = arena
        .make_cell(
            TypeCode::from_char('i').unwrap(),
            CellInit::Values((0..10).map(Scalar::Int).collect()),
        )
        .unwrap();

    assert_eq!(value.read().unwrap(), Scalar::Float(0.25));
    assert_eq!(array.read_at(1).unwrap(), Scalar::Int(1));

    array.write_at(9, Scalar::Int(90)).unwrap();
    assert_eq!(array.read_all().last(), Some(&Scalar::Int(90)));
    assert_eq!(value.read().unwrap(), Scalar::Float(0.25));
}

#[test]
fn test_char_cells() {
    let arena = SharedArena::private(64).unwrap();
    let init = CellInit::Values(b"abc".iter().map(|b| Scalar::Byte(*b)).collect());
    let mut letters = arena.make_cell(TypeCode::Char, init).unwrap();
    letters.write_at(1, Scalar::Byte(b'z')).unwrap();

    let bytes: Vec<Scalar> = letters.read_all();
    assert_eq!(
        bytes,
        vec![Scalar::Byte(b'a'), Scalar::Byte(b'z'), Scalar::Byte(b'c')]
    );
}

#[test]
fn test_index_errors() {
    let arena = SharedArena::private(256).unwrap();
    let mut arr = arena.array_zeroed::<u32>(4).unwrap();
    assert_eq!(arr.to_vec(), vec![0, 0, 0, 0]);

    let err = arr.set(4, 1).unwrap_err();
    assert_eq!(err, ShmError::IndexOutOfRange { index: 4, len: 4 });

    let err: ConduitError = arr.get(10).unwrap_err().into();
    assert_eq!(
        err.to_string(),
        "Shared memory error: Index 10 out of range for array of length 4"
    );
}

#[test]
fn test_exhausted_arena() {
    let arena = SharedArena::new(32).unwrap();
    arena.array_zeroed::<f64>(3).unwrap();
    assert!(matches!(
        arena.array_zeroed::<f64>(2),
        Err(ShmError::OutOfSpace { requested: 16, available: 8, capacity: 32 })
    ));
    arena.value(1.0f64).unwrap();
    assert_eq!(arena.stats().available(), 0);
}

#[test]
fn test_stats_report_usage() {
    let arena = SharedArena::new(128).unwrap();
    arena.value(1u8).unwrap();
    arena.value(1u64).unwrap();

    let stats = arena.stats();
    assert_eq!(
        stats,
        ArenaStats {
            capacity: 128,
            used: 16,
            live_cells: 2,
            shared: true,
        }
    );

    let json = serde_json::to_value(SharedArena::private(8).unwrap().stats()).unwrap();
    assert!(json.get("shared").is_none());
}

#[test]
fn test_cells_move_between_threads() {
    let arena = SharedArena::with_block(SharedBlock::anonymous(256).unwrap());
    let mut counters = arena.array_zeroed::<i64>(4).unwrap();
    let flag = arena.value(0u8).unwrap();

    let worker = thread::spawn(move || {
        for i in 0..4 {
            counters.set(i, (i as i64 + 1) * 100).unwrap();
        }
        counters
    });
    let counters = worker.join().unwrap();

    assert_eq!(counters.to_vec(), vec![100, 200, 300, 400]);
    assert_eq!(flag.get(), 0);
}

#[test]
fn test_rejected_values_leave_cell_untouched() {
    let arena = SharedArena::private(64).unwrap();
    let init = CellInit::Values(vec![Scalar::Int(1), Scalar::Int(2)]);
    let mut cell = arena.make_cell(TypeCode::Short, init).unwrap();

    let err = cell
        .write_all(&[Scalar::Int(5), Scalar::Int(70_000)])
        .unwrap_err();
    assert!(matches!(err, ShmError::ValueOutOfRange { typecode: 'h', .. }));
    assert_eq!(cell.read_all(), vec![Scalar::Int(1), Scalar::Int(2)]);

    assert!(matches!(
        cell.write(Scalar::Float(1.0)),
        Err(ShmError::TypeMismatch { .. })
    ));
}
