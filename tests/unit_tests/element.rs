use crate::standard_materials;
use mpfe::element::basis::{reference_coords, shape_functions, shape_functions_and_derivatives};
use mpfe::element::registry::{pack_tag, INSTANTIATED_SHAPES, XFEM_SHAPES};
use mpfe::element::shell::{integrate_thickness, Matrix6, Vector6};
use mpfe::element::solid::{isotropic_constitutive_matrix, linear_b_operator};
use mpfe::element::{
    add_btdb, evaluate_point, jacobian_determinant, CellShape, ElementRegistry, Kinematics, PhysicsKind,
    ProblemVariant,
};
use mpfe::nalgebra::{DMatrix, Point3};
use mpfe::proptest::affine_cell;
use mpfe::quadrature::GaussRule;
use mpfe::Error;
use proptest::prelude::*;
use std::collections::HashSet;
use util::{assert_approx_eq, assert_approx_matrix_eq};

fn create(
    registry: &ElementRegistry,
    physics: PhysicsKind,
    shape: CellShape,
    linedef: &str,
) -> mpfe::Result<mpfe::element::Element> {
    let materials = standard_materials();
    let node_ids = (0..shape.num_nodes()).collect();
    registry.create_element(0, 0, physics, ProblemVariant::Standard, shape, node_ids, linedef, &materials)
}

#[test]
fn registry_rejects_uninstantiated_shapes() {
    let registry = ElementRegistry::with_defaults();
    for shape in [CellShape::Quad8, CellShape::Wedge6] {
        assert!(matches!(
            registry.provide(PhysicsKind::Transport, shape, ProblemVariant::Standard),
            Err(Error::UnsupportedCellShape { shape: s, .. }) if s == shape
        ));
    }
    assert!(registry
        .provide(PhysicsKind::Transport, CellShape::Hex20, ProblemVariant::Standard)
        .is_ok());
}

#[test]
fn registry_reports_missing_variants() {
    let registry = ElementRegistry::with_defaults();
    assert!(matches!(
        registry.provide(PhysicsKind::Truss, CellShape::Quad4, ProblemVariant::Standard),
        Err(Error::UnknownElementVariant {
            physics: PhysicsKind::Truss,
            shape: CellShape::Quad4,
            variant: ProblemVariant::Standard,
        })
    ));
    assert!(matches!(
        registry.provide(PhysicsKind::Solid, CellShape::Hex8, ProblemVariant::LevelSet),
        Err(Error::UnknownElementVariant { .. })
    ));
    assert!(ElementRegistry::empty()
        .provide(PhysicsKind::Transport, CellShape::Hex8, ProblemVariant::Standard)
        .is_err());
}

#[test]
fn xfem_kernels_exist_for_volume_cells_only() {
    let registry = ElementRegistry::with_defaults();
    for shape in XFEM_SHAPES {
        let kernel = registry.provide_xfem(PhysicsKind::Transport, shape).unwrap();
        assert_eq!(kernel.variant(), ProblemVariant::Xfem);
        assert_eq!(kernel.shape(), shape);
    }
    assert!(matches!(
        registry.provide_xfem(PhysicsKind::Transport, CellShape::Quad4),
        Err(Error::UnsupportedCellShape { .. })
    ));
}

#[test]
fn pack_tags_are_unique() {
    let mut tags = HashSet::new();
    for physics in PhysicsKind::ALL {
        for shape in CellShape::ALL {
            for variant in ProblemVariant::ALL {
                assert!(tags.insert(pack_tag(physics, shape, variant)));
            }
        }
    }
}

#[test]
fn every_instantiated_shape_has_transport_kernels() {
    let registry = ElementRegistry::with_defaults();
    for shape in INSTANTIATED_SHAPES {
        for variant in [ProblemVariant::Standard, ProblemVariant::LevelSet] {
            let kernel = registry.provide(PhysicsKind::Transport, shape, variant).unwrap();
            assert_eq!(kernel.dofs_per_node(), 1);
        }
        assert!(registry
            .provide(PhysicsKind::Thermo, shape, ProblemVariant::Standard)
            .is_ok());
    }
}

#[test]
fn truss_rules_follow_the_line_shape() {
    let registry = ElementRegistry::with_defaults();
    let line2 = create(&registry, PhysicsKind::Truss, CellShape::Line2, "MAT 2 CROSS 0.5").unwrap();
    assert_eq!(line2.data().gauss_rule, GaussRule::Line(2));
    assert_eq!(line2.data().cross_section, Some(0.5));
    assert_eq!(line2.dofs_per_node(), 3);
    let line3 = create(&registry, PhysicsKind::Truss, CellShape::Line3, "MAT 2 CROSS 0.5").unwrap();
    assert_eq!(line3.data().gauss_rule, GaussRule::Line(3));

    let kernel = registry
        .provide(PhysicsKind::Truss, CellShape::Line2, ProblemVariant::Standard)
        .unwrap();
    assert!(matches!(
        kernel.optimal_gauss_rule(CellShape::Quad4),
        Err(Error::UnsupportedCellShape { .. })
    ));
    assert!(matches!(
        create(&registry, PhysicsKind::Truss, CellShape::Line2, "MAT 2"),
        Err(Error::Configuration(_))
    ));
}

#[test]
fn nurbs27_solids_require_the_full_rule() {
    let registry = ElementRegistry::with_defaults();
    assert!(matches!(
        create(&registry, PhysicsKind::Solid, CellShape::Nurbs27, "MAT 2 GP 2 2 2"),
        Err(Error::Configuration(_))
    ));
    assert!(matches!(
        create(&registry, PhysicsKind::Solid, CellShape::Nurbs27, "MAT 2"),
        Err(Error::Configuration(_))
    ));
    let element = create(&registry, PhysicsKind::Solid, CellShape::Nurbs27, "MAT 2 GP 3 3 3").unwrap();
    assert_eq!(element.data().kinematics, Kinematics::NonlinearTotLag);
    assert_eq!(element.data().gauss_rule, GaussRule::Hex(3, 3, 3));
}

#[test]
fn element_records_are_checked_against_materials() {
    let registry = ElementRegistry::with_defaults();
    assert!(matches!(
        create(&registry, PhysicsKind::Transport, CellShape::Quad4, "MAT 3"),
        Err(Error::Configuration(_))
    ));
    assert!(create(&registry, PhysicsKind::Thermo, CellShape::Quad4, "MAT 3").is_ok());
    assert!(matches!(
        create(&registry, PhysicsKind::Transport, CellShape::Quad4, "MAT 99"),
        Err(Error::Configuration(_))
    ));
    assert!(matches!(
        create(&registry, PhysicsKind::Transport, CellShape::Quad4, "MAT 1 COLOR red"),
        Err(Error::Configuration(_))
    ));
    let custom = create(&registry, PhysicsKind::Transport, CellShape::Quad4, "MAT 1 GP 3 3").unwrap();
    assert_eq!(custom.data().gauss_rule, GaussRule::Quad(3, 3));
}

#[test]
fn element_node_count_must_match_shape() {
    let registry = ElementRegistry::with_defaults();
    let materials = standard_materials();
    let result = registry.create_element(
        0,
        0,
        PhysicsKind::Transport,
        ProblemVariant::Standard,
        CellShape::Quad4,
        vec![0, 1, 2],
        "MAT 1",
        &materials,
    );
    assert!(matches!(result, Err(Error::Connectivity(_))));
}

#[test]
fn shape_functions_form_a_partition_of_unity() {
    for shape in CellShape::ALL {
        let dim = shape.reference_dim();
        let nodes = reference_coords(shape);
        assert_eq!(nodes.len(), shape.num_nodes());
        for (_, xi) in GaussRule::optimal_for(shape).points().iter() {
            let (values, derivatives) = shape_functions_and_derivatives(shape, xi);
            assert_eq!(derivatives.shape(), (dim, shape.num_nodes()));
            assert_approx_eq!(values.sum(), 1.0, abstol = 1e-12);
            for r in 0..dim {
                assert_approx_eq!(derivatives.row(r).sum(), 0.0, abstol = 1e-12);
            }
            // Linear functions are reproduced exactly
            for c in 0..dim {
                let interpolated: f64 = values.iter().zip(&nodes).map(|(n, x)| n * x[c]).sum();
                assert_approx_eq!(interpolated, xi[c], abstol = 1e-12);
                for r in 0..dim {
                    let gradient: f64 = (0..nodes.len()).map(|a| derivatives[(r, a)] * nodes[a][c]).sum();
                    let expected = if r == c { 1.0 } else { 0.0 };
                    assert_approx_eq!(gradient, expected, abstol = 1e-12);
                }
            }
        }
    }
}

#[test]
fn lagrange_shape_functions_interpolate_nodes() {
    for shape in CellShape::ALL {
        if shape.is_nurbs() || shape == CellShape::Pyramid5 {
            continue;
        }
        let nodes = reference_coords(shape);
        for (b, xi) in nodes.iter().enumerate() {
            let values = shape_functions(shape, xi);
            for a in 0..nodes.len() {
                let expected = if a == b { 1.0 } else { 0.0 };
                assert_approx_eq!(values[a], expected, abstol = 1e-12);
            }
        }
    }
}

#[test]
fn reversed_quad_has_negative_jacobian() {
    let coords = [
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(0.0, 1.0, 0.0),
        Point3::new(1.0, 1.0, 0.0),
        Point3::new(1.0, 0.0, 0.0),
    ];
    let xi = Point3::origin();
    assert_approx_eq!(jacobian_determinant(CellShape::Quad4, &coords, &xi), -0.25, abstol = 1e-14);
    assert!(matches!(
        evaluate_point(CellShape::Quad4, &coords, &xi),
        Err(Error::NegativeJacobian { .. })
    ));
}

#[test]
fn physical_gradients_of_a_scaled_hex() {
    let coords: Vec<_> = reference_coords(CellShape::Hex8)
        .into_iter()
        .map(|xi| Point3::new(2.0 * xi.x, xi.y, 0.5 * xi.z))
        .collect();
    let point = evaluate_point(CellShape::Hex8, &coords, &Point3::origin()).unwrap();
    assert_approx_eq!(point.determinant, 1.0, abstol = 1e-14);
    // x = sum_a N_a x_a has unit gradient in the x direction
    let dx: f64 = (0..8).map(|a| point.gradients[(0, a)] * coords[a].x).sum();
    assert_approx_eq!(dx, 1.0, abstol = 1e-14);
}

#[test]
fn add_btdb_matches_dense_product() {
    let b = DMatrix::from_fn(3, 8, |i, j| ((i + 2 * j) % 5) as f64 - 1.5);
    let d = isotropic_constitutive_matrix(2, 10.0, 0.25);
    let mut k = DMatrix::from_element(8, 8, 1.0);
    add_btdb(&mut k, &b, &d, 0.5);
    let expected = DMatrix::from_element(8, 8, 1.0) + b.transpose() * &d * &b * 0.5;
    assert_approx_matrix_eq!(k, expected, abstol = 1e-12);
}

#[test]
fn linear_b_operator_of_rigid_rotation_is_zero() {
    let coords = reference_coords(CellShape::Quad4);
    let point = evaluate_point(CellShape::Quad4, &coords, &Point3::new(0.3, -0.2, 0.0)).unwrap();
    let b = linear_b_operator(&point.gradients);
    // Infinitesimal rotation u = (-y, x)
    let u = DMatrix::from_fn(8, 1, |i, _| {
        let x = coords[i / 2];
        if i % 2 == 0 {
            -x.y
        } else {
            x.x
        }
    });
    assert_approx_matrix_eq!(&b * &u, DMatrix::<f64>::zeros(3, 1), abstol = 1e-13);
}

#[test]
fn shell_thickness_integration_of_constant_material() {
    let c = Matrix6::from_fn(|i, j| if i == j { 2.0 } else { 0.1 * (i + j) as f64 });
    let stress = Vector6::from_fn(|i, _| i as f64);
    let condfac = 0.5;
    let integration = integrate_thickness(3, condfac, |_| (c, stress));

    let d = &integration.d;
    assert_approx_matrix_eq!(d.transpose(), d.clone_owned(), abstol = 1e-14);
    let membrane = d.fixed_view::<6, 6>(0, 0).into_owned();
    let coupling = d.fixed_view::<6, 6>(6, 0).into_owned();
    let bending = d.fixed_view::<6, 6>(6, 6).into_owned();
    assert_approx_matrix_eq!(membrane, c * (2.0 * condfac), abstol = 1e-13);
    assert_approx_matrix_eq!(coupling, Matrix6::zeros(), abstol = 1e-13);
    assert_approx_matrix_eq!(bending, c * (2.0 * condfac / 3.0), abstol = 1e-13);

    assert_approx_matrix_eq!(integration.force_resultants(), stress * (2.0 * condfac), abstol = 1e-13);
    assert_approx_matrix_eq!(integration.moment_resultants(), Vector6::zeros(), abstol = 1e-13);
}

#[test]
fn shell_moments_follow_linear_stress_profiles() {
    let c = Matrix6::identity();
    let condfac = 1.0;
    // Stress linear in zeta gives moment resultants int zeta^2 = 2/3
    let integration = integrate_thickness(2, condfac, |e3| (c, Vector6::repeat(e3 / condfac)));
    assert_approx_matrix_eq!(integration.force_resultants(), Vector6::zeros(), abstol = 1e-14);
    assert_approx_matrix_eq!(integration.moment_resultants(), Vector6::repeat(2.0 / 3.0), abstol = 1e-14);
}

fn oriented_shapes() -> impl Strategy<Value = CellShape> {
    prop::sample::select(
        CellShape::ALL
            .into_iter()
            .filter(|shape| shape.reference_dim() >= 2)
            .collect::<Vec<_>>(),
    )
}

proptest! {
    #[test]
    fn jacobian_sign_follows_orientation(
        (shape, preserving, coords) in (oriented_shapes(), any::<bool>())
            .prop_flat_map(|(shape, preserving)| (Just(shape), Just(preserving), affine_cell(shape, preserving)))
    ) {
        for (_, xi) in GaussRule::optimal_for(shape).points().iter() {
            let det = jacobian_determinant(shape, &coords, xi);
            prop_assert_eq!(det > 0.0, preserving, "shape {} det {}", shape, det);
            prop_assert!(det.abs() > 1e-6);
        }
    }
}
