mod util;
use mesh_dofs::{
    data::{
        function::DiscreteFunction, mapper::EntityDofMapper, registry::ContainerRegistry,
        storage::SlotStorageContainer,
    },
    dof_error::{DofError, ErrorKind},
    topology::{adaptive::CompactionPolicy, index_source::EntityIndexSource, interval::IntervalMesh},
};
use static_assertions::assert_impl_all;
use util::*;

assert_impl_all!(EntityDofMapper: Send, Sync, Clone);
assert_impl_all!(ContainerRegistry<f64>: Send, Sync, Default);
assert_impl_all!(SlotStorageContainer<f64>: Send, Sync);
assert_impl_all!(DofError: std::error::Error, Send, Sync);

fn mesh_and_mapper() -> (IntervalMesh, EntityDofMapper) {
    let mesh = IntervalMesh::new(3, CompactionPolicy::default());
    let mapper = EntityDofMapper::new(&mesh, p1(), 1).unwrap();
    (mesh, mapper)
}

#[test]
fn last_detach_drops_the_container() {
    let (mesh, mapper) = mesh_and_mapper();
    let mut reg: ContainerRegistry = ContainerRegistry::new();
    let a = reg.attach(mesh.mesh_id(), &mapper);
    let b = reg.attach(mapper.mesh_id(), &mapper);
    assert_ne!(a, b);
    assert_eq!(reg.len(), 1);
    assert_eq!(reg.ref_count(&a.key()), 2);

    reg.detach(a).unwrap();
    assert_eq!(reg.ref_count(&b.key()), 1);
    reg.detach(b).unwrap();
    assert!(reg.is_empty());

    let err = reg.detach(b).unwrap_err();
    assert!(matches!(err, DofError::UnknownHandle(_)));
    assert_eq!(err.kind(), ErrorKind::InvalidState);
}

#[test]
fn reattach_gets_fresh_zeroed_storage() {
    let (_mesh, mapper) = mesh_and_mapper();
    let mut reg: ContainerRegistry = ContainerRegistry::new();
    let u = DiscreteFunction::attach("u", &mut reg, &mapper).unwrap();
    u.dofs_mut(&mut reg).unwrap().fill(3.0);
    let (old_handle, old_slot) = (u.handle(), u.slot());
    let old_container = reg.container(&old_handle).unwrap().id();
    u.release(&mut reg).unwrap();
    assert!(reg.is_empty());

    let v = DiscreteFunction::attach("v", &mut reg, &mapper).unwrap();
    assert_eq!(v.dofs(&reg).unwrap(), &[0.0; 4]);
    let container = reg.container(&v.handle()).unwrap();
    assert_ne!(container.id(), old_container);
    assert!(matches!(
        container.slot_slice(old_slot),
        Err(DofError::UnknownSlot(_))
    ));
    assert!(matches!(
        reg.container(&old_handle),
        Err(DofError::UnknownHandle(_))
    ));
}

#[test]
fn slots_of_one_container_are_isolated() {
    let (_mesh, mapper) = mesh_and_mapper();
    let mut reg: ContainerRegistry = ContainerRegistry::new();
    let u = DiscreteFunction::attach("u", &mut reg, &mapper).unwrap();
    let v = DiscreteFunction::attach("v", &mut reg, &mapper).unwrap();
    assert_eq!(u.handle().key(), v.handle().key());
    assert_ne!(u.slot(), v.slot());

    u.dofs_mut(&mut reg).unwrap().copy_from_slice(&[1.0, 2.0, 3.0, 4.0]);
    v.dofs_mut(&mut reg).unwrap()[2] = -1.0;
    assert_eq!(u.dofs(&reg).unwrap(), &[1.0, 2.0, 3.0, 4.0]);
    assert_eq!(v.dofs(&reg).unwrap(), &[0.0, 0.0, -1.0, 0.0]);
    assert_eq!(reg.container(&u.handle()).unwrap().live_slots(), 2);

    v.release(&mut reg).unwrap();
    assert_eq!(u.dofs(&reg).unwrap()[3], 4.0);
    u.release(&mut reg).unwrap();
}

#[test]
fn distinct_mappers_get_distinct_containers() {
    let (mesh, p1_mapper) = mesh_and_mapper();
    let p2_mapper = EntityDofMapper::new(&mesh, p2(), 1).unwrap();
    let mut reg: ContainerRegistry = ContainerRegistry::new();
    let u = DiscreteFunction::attach("u", &mut reg, &p1_mapper).unwrap();
    let w = DiscreteFunction::attach("w", &mut reg, &p2_mapper).unwrap();
    assert_eq!(reg.len(), 2);
    assert_eq!(u.dofs(&reg).unwrap().len(), 4);
    assert_eq!(w.dofs(&reg).unwrap().len(), 7);
    assert_eq!(u.handle().key().mesh, w.handle().key().mesh);
}

#[test]
fn remap_for_another_mapper_is_rejected() {
    let (mut mesh, mut mapper) = mesh_and_mapper();
    let other = EntityDofMapper::new(&mesh, p2(), 1).unwrap();
    let mut reg = ContainerRegistry::<f64>::new();
    let _u = DiscreteFunction::attach("u", &mut reg, &mapper).unwrap();
    mesh.refine(0).unwrap();
    mesh.compress().unwrap();
    let remap = mapper.update(&mesh).unwrap();
    assert!(matches!(
        reg.apply_remap(other.id(), &remap),
        Err(DofError::MapperMismatch { .. })
    ));
    assert_eq!(reg.apply_remap(mapper.id(), &remap), Ok(1));
    assert!(matches!(
        reg.apply_remap(mapper.id(), &remap),
        Err(DofError::RemapOutOfOrder { .. })
    ));
}
