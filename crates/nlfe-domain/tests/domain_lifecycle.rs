//! Load application and commit/revert cycle of a small truss domain.

use approx::assert_relative_eq;
use nalgebra::DVector;
use nlfe_domain::{
    BilinearSteel, Domain, Element, LoadPattern, NodalLoad, Node, SpConstraint, StateCodec,
    TimeSeries, Truss,
};

fn bar(steel: bool) -> Domain {
    let mut domain = Domain::new();
    domain.add_node(Node::new(1, 1, &[0.0])).unwrap();
    domain.add_node(Node::new(2, 1, &[2.0])).unwrap();
    let material: Box<dyn nlfe_domain::UniaxialMaterial> = if steel {
        Box::new(BilinearSteel::new(1, 250.0, 200_000.0, 0.01).unwrap())
    } else {
        Box::new(nlfe_domain::ElasticMaterial::new(1, 200_000.0))
    };
    domain
        .add_element(Box::new(Truss::new(1, 1, 2, 100.0, material)))
        .unwrap();
    domain.add_sp_constraint(SpConstraint::fixed(1, 1, 0)).unwrap();
    domain
        .add_load_pattern(
            LoadPattern::new(1, TimeSeries::linear()).with_load(NodalLoad::new(2, &[1000.0])),
        )
        .unwrap();
    domain
}

#[test]
fn loads_follow_the_time_series() {
    let mut domain = bar(false);
    domain.apply_load(0.3).unwrap();
    assert_relative_eq!(domain.node(2).unwrap().unbalanced_load()[0], 300.0);
    assert_relative_eq!(domain.current_time(), 0.3);

    domain.apply_load(0.5).unwrap();
    assert_relative_eq!(domain.node(2).unwrap().unbalanced_load()[0], 500.0);
}

#[test]
fn element_force_tracks_trial_displacement() {
    let mut domain = bar(false);
    let disp = DVector::from_vec(vec![1e-4]);
    domain.node_mut(2).unwrap().set_trial_disp(&disp).unwrap();
    domain.update().unwrap();

    let truss = domain.element(1).unwrap();
    let f = truss.resisting_force();
    // EA/L * u
    assert_relative_eq!(f[1], 200_000.0 * 100.0 / 2.0 * 1e-4, max_relative = 1e-12);
}

#[test]
fn plastic_history_survives_commit_and_snapshot() {
    let mut domain = bar(true);
    let yield_disp = 2.0 * 250.0 / 200_000.0;

    domain
        .node_mut(2)
        .unwrap()
        .set_trial_disp(&DVector::from_vec(vec![3.0 * yield_disp]))
        .unwrap();
    domain.update().unwrap();
    domain.commit();
    let bytes = domain.encode_state().unwrap();

    // unloading to zero displacement leaves residual compression
    domain
        .node_mut(2)
        .unwrap()
        .set_trial_disp(&DVector::zeros(1))
        .unwrap();
    domain.update().unwrap();
    let residual = domain.element(1).unwrap().resisting_force()[1];
    assert!(residual < 0.0);

    domain.revert_to_last_commit().unwrap();
    let loaded = domain.element(1).unwrap().resisting_force()[1];
    assert!(loaded > 250.0 * 100.0);

    domain.revert_to_start().unwrap();
    domain.decode_state(&bytes).unwrap();
    domain.update().unwrap();
    assert_relative_eq!(
        domain.element(1).unwrap().resisting_force()[1],
        loaded,
        max_relative = 1e-12
    );
}
