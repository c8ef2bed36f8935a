use model_optimizer_core::{
    Geometry, LodLevel, LodNode, LodTraversal, MeshNode, Node, NodeKind, OptimizerError, Scene,
    SceneVisitor,
};

fn triangle(offset: f32) -> Geometry {
    Geometry::new(vec![[offset, 0.0, 0.0], [offset + 1.0, 0.0, 0.0], [offset, 1.0, 0.0]])
}

fn lod_scene() -> Scene {
    let levels = [0.0, 50.0, 100.0]
        .into_iter()
        .enumerate()
        .map(|(i, distance)| LodLevel {
            distance,
            node: Node::group(vec![Node::mesh(triangle(i as f32), None)]),
        })
        .collect();
    let lod = Node::new(NodeKind::Lod(LodNode { levels })).named("lod");
    Scene::new(Node::group(vec![lod, Node::mesh(triangle(9.0), None).named("extra")]))
}

#[derive(Default)]
struct Recorder {
    depths: Vec<(Option<String>, usize)>,
    meshes: usize,
    nearest_only: bool,
}

impl SceneVisitor for Recorder {
    fn visit_node(&mut self, node: &Node, depth: usize) {
        self.depths.push((node.name.clone(), depth));
    }

    fn visit_mesh(&mut self, _mesh: &MeshNode) {
        self.meshes += 1;
    }

    fn lod_traversal(&self) -> LodTraversal {
        if self.nearest_only {
            LodTraversal::NearestLevel
        } else {
            LodTraversal::AllLevels
        }
    }
}

#[test]
fn test_visitor_sees_every_lod_level_by_default() {
    let scene = lod_scene();
    let mut recorder = Recorder::default();
    scene.accept(&mut recorder);

    assert_eq!(recorder.meshes, 4);
    assert!(recorder.depths.contains(&(Some("lod".to_string()), 1)));
    assert!(recorder.depths.contains(&(Some("extra".to_string()), 1)));
}

#[test]
fn test_nearest_level_traversal() {
    let scene = lod_scene();
    let mut recorder = Recorder {
        nearest_only: true,
        ..Recorder::default()
    };
    scene.accept(&mut recorder);

    assert_eq!(recorder.meshes, 2);
}

#[test]
fn test_level_for_distance() {
    let scene = lod_scene();
    let NodeKind::Lod(lod) = &scene.root.children[0].kind else {
        panic!("expected LOD node");
    };

    assert_eq!(lod.level_for_distance(10.0).unwrap().distance, 0.0);
    assert_eq!(lod.level_for_distance(50.0).unwrap().distance, 50.0);
    assert_eq!(lod.level_for_distance(1_000.0).unwrap().distance, 100.0);
    assert_eq!(lod.level_for_distance(-1.0).unwrap().distance, 0.0);
}

#[test]
fn test_mesh_mutation_reaches_lod_levels_and_stops_on_error() {
    let mut scene = lod_scene();
    let mut visited = 0;
    scene
        .try_for_each_mesh_mut(|mesh| {
            visited += 1;
            mesh.frustum_culled = true;
            Ok::<(), OptimizerError>(())
        })
        .unwrap();
    assert_eq!(visited, 4);

    let mut visited = 0;
    let result = scene.try_for_each_mesh_mut(|_| {
        visited += 1;
        Err(OptimizerError::Cancelled)
    });
    assert_eq!(result, Err(OptimizerError::Cancelled));
    assert_eq!(visited, 1);
}

#[test]
fn test_clone_is_deep() {
    let original = lod_scene();
    let mut copy = original.clone();
    copy.try_for_each_mesh_mut(|mesh| {
        mesh.geometry.positions.clear();
        Ok::<(), OptimizerError>(())
    })
    .unwrap();

    assert_ne!(copy, original);
    assert_eq!(original.root.mesh_count(), 4);
    let first = original.root.children[1].as_mesh().unwrap();
    assert_eq!(first.geometry.vertex_count(), 3);
}
