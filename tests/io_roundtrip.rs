mod util;
use mesh_dofs::{
    config::SpaceConfig,
    data::{registry::ContainerRegistry, space::DiscreteSpace},
    dof_error::{DofError, ErrorKind},
    io::{read_dof_vector, read_function, write_dof_vector, write_function, DOF_VECTOR_VERSION},
    topology::{adaptive::CompactionPolicy, interval::IntervalMesh},
};
use util::*;

fn tagged_space(mesh: &IntervalMesh, tag: u32) -> DiscreteSpace {
    let config = SpaceConfig {
        name: "pressure".into(),
        space_tag: tag,
        ..SpaceConfig::default()
    };
    DiscreteSpace::new(mesh, p1(), config).unwrap()
}

#[test]
fn function_survives_a_round_trip() {
    let mesh = IntervalMesh::new(4, CompactionPolicy::default());
    let space = tagged_space(&mesh, 11);
    let mut reg: ContainerRegistry = ContainerRegistry::new();
    let p = space.function("p", &mut reg).unwrap();
    p.dofs_mut(&mut reg)
        .unwrap()
        .copy_from_slice(&[0.5, -1.0, 2.25, 1e-300, f64::MAX]);

    let mut bytes = Vec::new();
    write_function(&mut bytes, &mesh, &space, &reg, &p).unwrap();

    let q = space.function("q", &mut reg).unwrap();
    let header = read_function(&bytes[..], &space, &mut reg, &q).unwrap();
    assert_eq!(header.name, "p");
    assert_eq!(header.space_tag, 11);
    assert_eq!(header.version, DOF_VECTOR_VERSION);
    assert_eq!(header.count, 5);
    assert_eq!(q.dofs(&reg).unwrap(), p.dofs(&reg).unwrap());
}

#[test]
fn writing_during_adaptation_is_refused() {
    let mut mesh = IntervalMesh::new(4, CompactionPolicy::default());
    let space = tagged_space(&mesh, 0);
    mesh.coarsen(1, 2).unwrap();
    let err = write_dof_vector(Vec::new(), &mesh, &space, "p", &[0.0; 5]).unwrap_err();
    assert_eq!(err, DofError::NotCompacted);
    assert_eq!(err.kind(), ErrorKind::InvalidState);
}

#[test]
fn header_mismatches_are_io_errors() {
    let mesh = IntervalMesh::new(4, CompactionPolicy::default());
    let space = tagged_space(&mesh, 3);
    let mut bytes = Vec::new();
    write_dof_vector(&mut bytes, &mesh, &space, "p", &[1.0; 5]).unwrap();
    let mut dst = [0.0; 5];

    let other = tagged_space(&mesh, 4);
    let err = read_dof_vector(&bytes[..], &other, &mut dst).unwrap_err();
    assert_eq!(err, DofError::SpaceMismatch { expected: 4, found: 3 });
    assert_eq!(err.kind(), ErrorKind::Io);

    let mut future = bytes.clone();
    future[4..8].copy_from_slice(&(DOF_VECTOR_VERSION + 1).to_le_bytes());
    let err = read_dof_vector(&future[..], &space, &mut dst).unwrap_err();
    assert!(matches!(err, DofError::VersionMismatch { found, .. } if found == DOF_VECTOR_VERSION + 1));
    assert_eq!(err.kind(), ErrorKind::Io);

    let finer = IntervalMesh::new(5, CompactionPolicy::default());
    let finer_space = tagged_space(&finer, 3);
    let mut dst6 = [0.0; 6];
    let err = read_dof_vector(&bytes[..], &finer_space, &mut dst6).unwrap_err();
    assert_eq!(
        err,
        DofError::SizeMismatch {
            name: "p".into(),
            expected: 6,
            found: 5
        }
    );
    assert_eq!(err.kind(), ErrorKind::Io);
    // nothing was consumed into the destination
    assert_eq!(dst, [0.0; 5]);
    assert_eq!(dst6, [0.0; 6]);
}

#[test]
fn wrong_destination_length_is_rejected() {
    let mesh = IntervalMesh::new(2, CompactionPolicy::default());
    let space = tagged_space(&mesh, 0);
    let mut bytes = Vec::new();
    write_dof_vector(&mut bytes, &mesh, &space, "p", &[1.0, 2.0, 3.0]).unwrap();
    let mut short = [0.0; 2];
    assert_eq!(
        read_dof_vector(&bytes[..], &space, &mut short),
        Err(DofError::VectorSizeMismatch {
            expected: 3,
            found: 2
        })
    );
    assert!(matches!(
        write_dof_vector(Vec::new(), &mesh, &space, "p", &[1.0]),
        Err(DofError::VectorSizeMismatch { .. })
    ));
}
