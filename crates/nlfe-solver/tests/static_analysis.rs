/// Static analyses of small bar models against closed-form answers
///
/// Bars are built from 1-DOF nodes at unit spacing; every segment has
/// EA/L = 1000 unless stated otherwise.
use approx::assert_relative_eq;
use nalgebra::DMatrix;
use nlfe_domain::{
    BilinearSteel, Domain, ElasticMaterial, LoadPattern, MpConstraint, NodalLoad, Node,
    SpConstraint, TimeSeries, Truss, UniaxialMaterial, ZeroLength,
};
use nlfe_solver::{
    Analysis, BandSpdSoe, BiCgStab, ConstraintHandler, ConvergenceTest, DisplacementControl,
    FullGenSoe, InitialInterpolatedLineSearch, LagrangeHandler, LinearSoe, LoadControl,
    ModifiedNewton, NewtonRaphson, NormTest, PenaltyHandler, PlainHandler, PlainNumberer,
    ReverseCuthillMcKee, SolverError, SparseCholesky, SparseGenSoe, SubstructuredSoe, TangentKind,
    TransformationHandler,
};
use std::collections::BTreeMap;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Fixed at node 1, load `p` at the last node
fn elastic_bar(num_nodes: i32, p: f64) -> Domain {
    let mut domain = Domain::new();
    for tag in 1..=num_nodes {
        domain
            .add_node(Node::new(tag, 1, &[(tag - 1) as f64]))
            .unwrap();
    }
    for tag in 1..num_nodes {
        domain
            .add_element(Box::new(Truss::new(
                tag,
                tag,
                tag + 1,
                1.0,
                Box::new(ElasticMaterial::new(tag, 1000.0)),
            )))
            .unwrap();
    }
    domain.add_sp_constraint(SpConstraint::fixed(1, 1, 0)).unwrap();
    domain
        .add_load_pattern(
            LoadPattern::new(1, TimeSeries::linear()).with_load(NodalLoad::new(num_nodes, &[p])),
        )
        .unwrap();
    domain
}

/// One truss of bilinear steel (f_y = 10, E0 = 1000, b = 0.1) loaded by 15
fn steel_bar() -> Domain {
    let mut domain = Domain::new();
    domain.add_node(Node::new(1, 1, &[0.0])).unwrap();
    domain.add_node(Node::new(2, 1, &[1.0])).unwrap();
    let steel: Box<dyn UniaxialMaterial> = Box::new(BilinearSteel::new(1, 10.0, 1000.0, 0.1).unwrap());
    domain
        .add_element(Box::new(Truss::new(1, 1, 2, 1.0, steel)))
        .unwrap();
    domain.add_sp_constraint(SpConstraint::fixed(1, 1, 0)).unwrap();
    domain
        .add_load_pattern(
            LoadPattern::new(1, TimeSeries::linear()).with_load(NodalLoad::new(2, &[15.0])),
        )
        .unwrap();
    domain
}

fn static_analysis(
    handler: Box<dyn ConstraintHandler>,
    soe: Box<dyn LinearSoe>,
    increment: f64,
    test: Box<dyn ConvergenceTest>,
) -> Analysis {
    Analysis::new(
        handler,
        Box::new(PlainNumberer),
        soe,
        Box::new(LoadControl::new(increment)),
        Box::new(NewtonRaphson::new()),
        test,
    )
}

fn disp(domain: &Domain, node: i32) -> f64 {
    domain.node(node).unwrap().committed_disp()[0]
}

#[test]
fn test_linear_bar_with_every_system() {
    init_logging();
    let partition: BTreeMap<i32, usize> = (1..=6).map(|t| (t, if t <= 3 { 0 } else { 1 })).collect();
    let systems: Vec<Box<dyn LinearSoe>> = vec![
        Box::new(FullGenSoe::new()),
        Box::new(BandSpdSoe::new()),
        Box::new(SparseGenSoe::new(Box::new(SparseCholesky::default()))),
        Box::new(SparseGenSoe::new(Box::new(BiCgStab::default()))),
        Box::new(SubstructuredSoe::new(partition)),
    ];

    for soe in systems {
        let name = soe.name();
        let mut domain = elastic_bar(6, 10.0);
        let mut analysis = static_analysis(
            Box::new(PlainHandler),
            soe,
            1.0,
            Box::new(NormTest::unbalance(1e-8, 10)),
        );
        let report = analysis.analyze_step(&mut domain, 0.0).unwrap();
        assert!(report.iterations <= 2, "{name}: {} iterations", report.iterations);
        assert_relative_eq!(report.time, 1.0);
        for tag in 2..=6 {
            assert_relative_eq!(disp(&domain, tag), 0.01 * (tag - 1) as f64, epsilon = 1e-9);
        }
        assert_eq!(analysis.model().num_eqn(), 5, "{name}");
    }
}

#[test]
fn test_bilinear_steel_beyond_yield() {
    init_logging();
    let mut domain = steel_bar();
    let mut analysis = static_analysis(
        Box::new(PlainHandler),
        Box::new(FullGenSoe::new()),
        0.1,
        Box::new(NormTest::unbalance(1e-8, 10)),
    );
    let reports = analysis.analyze(&mut domain, 10, 0.0).unwrap();
    assert_eq!(reports.len(), 10);
    // the step that crosses yield needs a second iteration
    assert!(reports.iter().any(|r| r.iterations >= 2));

    // σ = E_sh ε + f_y (1 − b) = 15 → ε = 0.06
    assert_relative_eq!(disp(&domain, 2), 0.06, epsilon = 1e-9);
    let force = domain.element(1).unwrap().resisting_force();
    assert_relative_eq!(force[1], 15.0, epsilon = 1e-6);
}

#[test]
fn test_modified_newton_with_initial_tangent_reaches_same_state() {
    init_logging();
    let mut domain = steel_bar();
    let mut analysis = Analysis::new(
        Box::new(PlainHandler),
        Box::new(PlainNumberer),
        Box::new(FullGenSoe::new()),
        Box::new(LoadControl::new(0.1)),
        Box::new(ModifiedNewton::new().with_tangent(TangentKind::Initial)),
        Box::new(NormTest::unbalance(1e-8, 500)),
    );
    let reports = analysis.analyze(&mut domain, 10, 0.0).unwrap();
    assert!(reports.last().unwrap().iterations > 10);
    assert_relative_eq!(disp(&domain, 2), 0.06, epsilon = 1e-8);
}

#[test]
fn test_newton_with_line_search() {
    init_logging();
    let mut domain = steel_bar();
    let mut analysis = Analysis::new(
        Box::new(PlainHandler),
        Box::new(ReverseCuthillMcKee),
        Box::new(FullGenSoe::new()),
        Box::new(LoadControl::new(0.25)),
        Box::new(NewtonRaphson::new().with_line_search(InitialInterpolatedLineSearch::default())),
        Box::new(NormTest::unbalance(1e-8, 25)),
    );
    analysis.analyze(&mut domain, 4, 0.0).unwrap();
    // λ = 1 → load 15
    assert_relative_eq!(disp(&domain, 2), 0.06, epsilon = 1e-8);
}

#[test]
fn test_displacement_control_recovers_load_factor() {
    init_logging();
    let mut domain = steel_bar();
    let mut analysis = Analysis::new(
        Box::new(PlainHandler),
        Box::new(PlainNumberer),
        Box::new(FullGenSoe::new()),
        Box::new(DisplacementControl::new(2, 0, 0.01)),
        Box::new(NewtonRaphson::new()),
        Box::new(NormTest::unbalance(1e-8, 10)),
    );

    let first = analysis.analyze_step(&mut domain, 0.0).unwrap();
    // u = 0.01 is the yield displacement: P = 10 = λ · 15
    assert_relative_eq!(first.time, 10.0 / 15.0, epsilon = 1e-9);

    analysis.analyze(&mut domain, 5, 0.0).unwrap();
    assert_relative_eq!(disp(&domain, 2), 0.06, epsilon = 1e-9);
    assert_relative_eq!(domain.committed_time(), 1.0, epsilon = 1e-9);
}

#[test]
fn test_failed_step_reverts_trial_state() {
    init_logging();
    let mut domain = steel_bar();
    let mut analysis = static_analysis(
        Box::new(PlainHandler),
        Box::new(FullGenSoe::new()),
        1.0,
        Box::new(NormTest::unbalance(1e-12, 1)),
    );

    let err = analysis.analyze_step(&mut domain, 0.0).unwrap_err();
    assert!(matches!(err, SolverError::NonConvergence { iterations: 1, .. }));
    assert_eq!(err.status_code(), -5);

    let node = domain.node(2).unwrap();
    assert_eq!(node.trial_disp()[0], 0.0);
    assert_eq!(domain.current_time(), 0.0);
    let force = domain.element(1).unwrap().resisting_force();
    assert_eq!(force[1], 0.0);
}

#[test]
fn test_prescribed_displacement_is_held() {
    init_logging();
    let mut domain = Domain::new();
    for tag in 1..=3 {
        domain
            .add_node(Node::new(tag, 1, &[(tag - 1) as f64]))
            .unwrap();
    }
    for tag in 1..=2 {
        domain
            .add_element(Box::new(Truss::new(
                tag,
                tag,
                tag + 1,
                1.0,
                Box::new(ElasticMaterial::new(tag, 1000.0)),
            )))
            .unwrap();
    }
    domain.add_sp_constraint(SpConstraint::fixed(1, 1, 0)).unwrap();
    domain
        .add_sp_constraint(SpConstraint::prescribed(2, 2, 0, 0.01))
        .unwrap();

    let mut analysis = static_analysis(
        Box::new(PlainHandler),
        Box::new(FullGenSoe::new()),
        1.0,
        Box::new(NormTest::unbalance(1e-10, 5)),
    );
    analysis.analyze_step(&mut domain, 0.0).unwrap();
    assert_eq!(analysis.model().num_eqn(), 1);
    assert_relative_eq!(disp(&domain, 2), 0.01);
    // unloaded end follows rigidly
    assert_relative_eq!(disp(&domain, 3), 0.01, epsilon = 1e-12);
    assert_relative_eq!(domain.element(1).unwrap().resisting_force()[1], 10.0, epsilon = 1e-9);
}

/// Bar 1–2 and a spring 3–4 tied by `u3 = u2`; u2 = P / (1000 + 500)
fn tied_domain() -> Domain {
    let mut domain = Domain::new();
    domain.add_node(Node::new(1, 1, &[0.0])).unwrap();
    domain.add_node(Node::new(2, 1, &[1.0])).unwrap();
    domain.add_node(Node::new(3, 1, &[1.0])).unwrap();
    domain.add_node(Node::new(4, 1, &[1.0])).unwrap();
    domain
        .add_element(Box::new(Truss::new(
            1,
            1,
            2,
            1.0,
            Box::new(ElasticMaterial::new(1, 1000.0)),
        )))
        .unwrap();
    domain
        .add_element(Box::new(ZeroLength::new(
            2,
            4,
            3,
            0,
            Box::new(ElasticMaterial::new(2, 500.0)),
        )))
        .unwrap();
    domain.add_sp_constraint(SpConstraint::fixed(1, 1, 0)).unwrap();
    domain.add_sp_constraint(SpConstraint::fixed(2, 4, 0)).unwrap();
    domain
        .add_mp_constraint(MpConstraint::equal_dof(1, 2, 3, &[0]).unwrap())
        .unwrap();
    domain
        .add_load_pattern(
            LoadPattern::new(1, TimeSeries::constant()).with_load(NodalLoad::new(2, &[15.0])),
        )
        .unwrap();
    domain
}

#[test]
fn test_multi_point_constraint_under_every_handler() {
    init_logging();
    let cases: Vec<(Box<dyn ConstraintHandler>, usize, f64)> = vec![
        (Box::new(TransformationHandler), 1, 1e-12),
        (Box::new(PenaltyHandler::default()), 4, 1e-9),
        (Box::new(LagrangeHandler::default()), 7, 1e-12),
    ];
    for (handler, num_eqn, tol) in cases {
        let name = handler.name();
        let mut domain = tied_domain();
        let mut analysis = static_analysis(
            handler,
            Box::new(FullGenSoe::new()),
            1.0,
            Box::new(NormTest::disp_incr(1e-10, 10)),
        );
        analysis.analyze_step(&mut domain, 0.0).unwrap();
        assert_eq!(analysis.model().num_eqn(), num_eqn, "{name}");
        assert_relative_eq!(disp(&domain, 2), 0.01, epsilon = tol);
        assert_relative_eq!(disp(&domain, 3), 0.01, epsilon = tol);
        assert_relative_eq!(disp(&domain, 4), 0.0, epsilon = tol);
    }
}

#[test]
fn test_general_mp_coefficient() {
    // u3 = 2·u2 through a general coefficient matrix
    init_logging();
    let mut domain = tied_domain();
    domain.remove_mp_constraint(1).unwrap();
    domain
        .add_mp_constraint(
            MpConstraint::new(1, 2, 3, vec![0], vec![0], DMatrix::from_element(1, 1, 2.0)).unwrap(),
        )
        .unwrap();
    let mut analysis = static_analysis(
        Box::new(TransformationHandler),
        Box::new(FullGenSoe::new()),
        1.0,
        Box::new(NormTest::disp_incr(1e-10, 10)),
    );
    analysis.analyze_step(&mut domain, 0.0).unwrap();
    // (1000 + 4·500) u2 = 15
    assert_relative_eq!(disp(&domain, 2), 0.005, epsilon = 1e-12);
    assert_relative_eq!(disp(&domain, 3), 0.01, epsilon = 1e-12);
}

#[test]
fn test_lagrange_multipliers_with_sparse_system() {
    // multiplier rows leave zero diagonals in the sparse matrix
    init_logging();
    let mut domain = tied_domain();
    let mut analysis = static_analysis(
        Box::new(LagrangeHandler::default()),
        Box::new(SparseGenSoe::default()),
        1.0,
        Box::new(NormTest::disp_incr(1e-10, 10)),
    );
    analysis.analyze_step(&mut domain, 0.0).unwrap();
    assert_eq!(analysis.model().num_eqn(), 7);
    assert_relative_eq!(disp(&domain, 2), 0.01, epsilon = 1e-12);
    assert_relative_eq!(disp(&domain, 3), 0.01, epsilon = 1e-12);
    assert_relative_eq!(disp(&domain, 1), 0.0, epsilon = 1e-12);
}
