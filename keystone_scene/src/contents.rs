// Copyright 2025 the Keystone Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Node payloads: worlds, layers, groups, entities, brushes, and patches.
//!
//! [`NodeKind`] is what a tree node holds. [`NodeContents`] is the subset of kinds that
//! can be cloned, transformed, and swapped into an existing node; it is the transfer
//! type used when rebuilding cloned subtrees.

use alloc::{format, string::String, vec::Vec};
use core::fmt;

use glam::{DMat4, DVec3};

use crate::error::SceneError;
use crate::types::Bounds3;

/// Property key holding the position of a point entity.
pub const ORIGIN_KEY: &str = "origin";

/// Property key holding the entity class.
pub const CLASSNAME_KEY: &str = "classname";

/// Half the edge length of the box used as the bounds of a point entity.
pub const POINT_ENTITY_HALF_SIZE: f64 = 8.0;

/// Transformations whose determinant is closer to zero than this are degenerate.
pub const DETERMINANT_EPSILON: f64 = 1e-12;

/// Whether `transformation` collapses space (or is not finite).
pub fn is_degenerate(transformation: &DMat4) -> bool {
    let det = transformation.determinant();
    !det.is_finite() || (det > -DETERMINANT_EPSILON && det < DETERMINANT_EPSILON)
}

/// Type tag of a node, without its payload.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum NodeType {
    /// The root of a map.
    World,
    /// A layer directly below the world.
    Layer,
    /// A group of objects, possibly linked.
    Group,
    /// A point or brush entity.
    Entity,
    /// A convex brush.
    Brush,
    /// A bezier patch.
    Patch,
}

impl NodeType {
    /// Lower-case name of the node type.
    pub const fn name(self) -> &'static str {
        match self {
            Self::World => "world",
            Self::Layer => "layer",
            Self::Group => "group",
            Self::Entity => "entity",
            Self::Brush => "brush",
            Self::Patch => "patch",
        }
    }

    /// Whether a node of this type may own a child of type `child`.
    ///
    /// This only encodes the type rules. Adding a group to a group is further
    /// restricted by [`Tree::can_add_child`](crate::Tree::can_add_child).
    pub const fn accepts(self, child: Self) -> bool {
        matches!(
            (self, child),
            (Self::World, Self::Layer)
                | (
                    Self::Layer | Self::Group,
                    Self::Group | Self::Entity | Self::Brush | Self::Patch
                )
                | (Self::Entity, Self::Brush | Self::Patch)
        )
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Payload of the world node.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct World {
    /// Display name.
    pub name: String,
}

impl World {
    /// Create a world with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Payload of a layer node.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Layer {
    /// Display name.
    pub name: String,
    /// Position of the layer in the layer list.
    pub sort_index: i32,
}

impl Layer {
    /// Create a layer with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sort_index: 0,
        }
    }
}

/// Payload of a group node.
#[derive(Clone, Debug, PartialEq)]
pub struct Group {
    name: String,
    transformation: DMat4,
    linked_group_id: Option<String>,
}

impl Group {
    /// Create an unlinked group with an identity transformation.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transformation: DMat4::IDENTITY,
            linked_group_id: None,
        }
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Set the display name.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Accumulated transformation applied to the group since it was created.
    pub fn transformation(&self) -> DMat4 {
        self.transformation
    }

    /// Replace the accumulated transformation.
    pub fn set_transformation(&mut self, transformation: DMat4) {
        self.transformation = transformation;
    }

    /// Id of the link set this group belongs to, if any.
    pub fn linked_group_id(&self) -> Option<&str> {
        self.linked_group_id.as_deref()
    }

    /// Make this group a member of the given link set.
    pub fn set_linked_group_id(&mut self, linked_group_id: impl Into<String>) {
        self.linked_group_id = Some(linked_group_id.into());
    }

    /// Remove this group from its link set.
    pub fn reset_linked_group_id(&mut self) {
        self.linked_group_id = None;
    }

    /// Pre-multiply the accumulated transformation.
    pub fn transform(&mut self, transformation: &DMat4) {
        self.transformation = *transformation * self.transformation;
    }
}

/// A single key/value pair of an entity.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityProperty {
    /// Property key.
    pub key: String,
    /// Property value.
    pub value: String,
}

impl EntityProperty {
    /// Create a property.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Payload of an entity node.
///
/// Properties keep their insertion order. Protected property keys are exempt from
/// being overwritten when a linked group is updated, and the link id correlates this
/// entity with the entities at the same position in the other members of its link set.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Entity {
    properties: Vec<EntityProperty>,
    protected_properties: Vec<String>,
    link_id: Option<String>,
}

impl Entity {
    /// Create an entity without properties.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an entity with the given properties.
    pub fn with_properties(properties: Vec<EntityProperty>) -> Self {
        Self {
            properties,
            ..Self::default()
        }
    }

    /// All properties in insertion order.
    pub fn properties(&self) -> &[EntityProperty] {
        &self.properties
    }

    /// Replace all properties.
    pub fn set_properties(&mut self, properties: Vec<EntityProperty>) {
        self.properties = properties;
    }

    /// Value of the property with the given key.
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|p| p.key == key)
            .map(|p| p.value.as_str())
    }

    /// Whether a property with the given key exists.
    pub fn has_property(&self, key: &str) -> bool {
        self.property(key).is_some()
    }

    /// Set the value of a property, appending it if the key is new.
    pub fn add_or_update_property(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.properties.iter_mut().find(|p| p.key == key) {
            Some(p) => p.value = value,
            None => self.properties.push(EntityProperty { key, value }),
        }
    }

    /// Remove a property and return its value.
    pub fn remove_property(&mut self, key: &str) -> Option<String> {
        let pos = self.properties.iter().position(|p| p.key == key)?;
        Some(self.properties.remove(pos).value)
    }

    /// The `classname` property, if present.
    pub fn classname(&self) -> Option<&str> {
        self.property(CLASSNAME_KEY)
    }

    /// Keys exempt from linked group propagation.
    pub fn protected_properties(&self) -> &[String] {
        &self.protected_properties
    }

    /// Replace the set of protected keys.
    pub fn set_protected_properties(&mut self, keys: Vec<String>) {
        self.protected_properties = keys;
    }

    /// Whether the key is protected.
    pub fn is_protected(&self, key: &str) -> bool {
        self.protected_properties.iter().any(|k| k == key)
    }

    /// Link id shared with corresponding entities of the link set.
    pub fn link_id(&self) -> Option<&str> {
        self.link_id.as_deref()
    }

    /// Set the link id.
    pub fn set_link_id(&mut self, link_id: impl Into<String>) {
        self.link_id = Some(link_id.into());
    }

    /// Clear the link id.
    pub fn reset_link_id(&mut self) {
        self.link_id = None;
    }

    /// Position parsed from the `origin` property.
    ///
    /// A missing property or missing / malformed components read as zero.
    pub fn origin(&self) -> DVec3 {
        self.property(ORIGIN_KEY)
            .map(parse_vec3)
            .unwrap_or(DVec3::ZERO)
    }

    /// Write the `origin` property.
    pub fn set_origin(&mut self, origin: DVec3) {
        // Adding zero turns -0 into 0.
        let origin = origin + DVec3::ZERO;
        self.add_or_update_property(
            ORIGIN_KEY,
            format!("{} {} {}", origin.x, origin.y, origin.z),
        );
    }

    /// Map the origin through `transformation`.
    ///
    /// The `origin` property is only written if the position actually changes.
    pub fn transform(&mut self, transformation: &DMat4) {
        let origin = self.origin();
        let transformed = transformation.transform_point3(origin);
        if transformed != origin {
            self.set_origin(transformed);
        }
    }

    /// Bounds of the entity when it has no children: a fixed box around the origin.
    pub fn point_bounds(&self) -> Bounds3 {
        Bounds3::around(self.origin(), POINT_ENTITY_HALF_SIZE)
    }
}

fn parse_vec3(s: &str) -> DVec3 {
    let mut components = s
        .split_whitespace()
        .map(|c| c.parse::<f64>().unwrap_or(0.0));
    let x = components.next().unwrap_or(0.0);
    let y = components.next().unwrap_or(0.0);
    let z = components.next().unwrap_or(0.0);
    DVec3::new(x, y, z)
}

/// A face of a brush: a convex polygon over the brush vertices.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BrushFace {
    indices: Vec<usize>,
    material: String,
}

impl BrushFace {
    /// Create a face from vertex indices in counter-clockwise order (seen from outside).
    pub fn new(indices: Vec<usize>, material: impl Into<String>) -> Self {
        Self {
            indices,
            material: material.into(),
        }
    }

    /// Vertex indices in counter-clockwise order.
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// Material name.
    pub fn material(&self) -> &str {
        &self.material
    }
}

/// Payload of a brush node: a convex polyhedron.
#[derive(Clone, Debug, PartialEq)]
pub struct Brush {
    vertices: Vec<DVec3>,
    faces: Vec<BrushFace>,
}

impl Brush {
    /// Create a brush, checking that every face refers to existing vertices.
    pub fn new(vertices: Vec<DVec3>, faces: Vec<BrushFace>) -> Result<Self, SceneError> {
        if vertices.is_empty() || faces.is_empty() {
            return Err(SceneError::EmptyBrush);
        }
        let vertex_count = vertices.len();
        for face in &faces {
            if face.indices.len() < 3 {
                return Err(SceneError::InvalidBrushFace {
                    index: face.indices.len(),
                    vertex_count,
                });
            }
            if let Some(&index) = face.indices.iter().find(|&&i| i >= vertex_count) {
                return Err(SceneError::InvalidBrushFace {
                    index,
                    vertex_count,
                });
            }
        }
        Ok(Self { vertices, faces })
    }

    /// Create an axis-aligned box brush with the same material on every face.
    pub fn cuboid(bounds: Bounds3, material: &str) -> Self {
        let (lo, hi) = (bounds.min, bounds.max);
        let vertices = alloc::vec![
            DVec3::new(lo.x, lo.y, lo.z),
            DVec3::new(hi.x, lo.y, lo.z),
            DVec3::new(hi.x, hi.y, lo.z),
            DVec3::new(lo.x, hi.y, lo.z),
            DVec3::new(lo.x, lo.y, hi.z),
            DVec3::new(hi.x, lo.y, hi.z),
            DVec3::new(hi.x, hi.y, hi.z),
            DVec3::new(lo.x, hi.y, hi.z),
        ];
        let faces = [
            [0, 3, 2, 1],
            [4, 5, 6, 7],
            [0, 1, 5, 4],
            [2, 3, 7, 6],
            [0, 4, 7, 3],
            [1, 2, 6, 5],
        ]
        .into_iter()
        .map(|indices| BrushFace::new(indices.to_vec(), material))
        .collect();
        Self { vertices, faces }
    }

    /// Brush vertices.
    pub fn vertices(&self) -> &[DVec3] {
        &self.vertices
    }

    /// Brush faces.
    pub fn faces(&self) -> &[BrushFace] {
        &self.faces
    }

    /// Bounds of the vertices.
    pub fn bounds(&self) -> Bounds3 {
        Bounds3::from_points(self.vertices.iter().copied()).unwrap_or(Bounds3::ZERO)
    }

    /// Transform the brush in place.
    ///
    /// Fails without modifying the brush if the transformation is degenerate or if
    /// the result would not fit into `world_bounds`. Mirroring transformations
    /// reverse the face winding so that faces keep pointing outwards.
    pub fn transform(
        &mut self,
        world_bounds: &Bounds3,
        transformation: &DMat4,
    ) -> Result<(), SceneError> {
        if is_degenerate(transformation) {
            return Err(SceneError::DegenerateTransform);
        }
        let vertices: Vec<DVec3> = self
            .vertices
            .iter()
            .map(|&v| transformation.transform_point3(v))
            .collect();
        let bounds = Bounds3::from_points(vertices.iter().copied()).ok_or(SceneError::EmptyBrush)?;
        if !world_bounds.contains(&bounds) {
            return Err(SceneError::BrushOutOfWorld);
        }
        self.vertices = vertices;
        if transformation.determinant() < 0.0 {
            for face in &mut self.faces {
                face.indices.reverse();
            }
        }
        Ok(())
    }
}

/// Payload of a patch node: a grid of bezier control points.
#[derive(Clone, Debug, PartialEq)]
pub struct Patch {
    row_count: usize,
    column_count: usize,
    control_points: Vec<DVec3>,
    material: String,
}

impl Patch {
    /// Create a patch. Both dimensions must be odd and at least 3, and the number of
    /// control points must equal `row_count * column_count`.
    pub fn new(
        row_count: usize,
        column_count: usize,
        control_points: Vec<DVec3>,
        material: impl Into<String>,
    ) -> Result<Self, SceneError> {
        let valid_dimension = |n: usize| n >= 3 && n % 2 == 1;
        if !valid_dimension(row_count)
            || !valid_dimension(column_count)
            || control_points.len() != row_count * column_count
        {
            return Err(SceneError::InvalidPatch {
                rows: row_count,
                columns: column_count,
                points: control_points.len(),
            });
        }
        Ok(Self {
            row_count,
            column_count,
            control_points,
            material: material.into(),
        })
    }

    /// Number of control point rows.
    pub fn row_count(&self) -> usize {
        self.row_count
    }

    /// Number of control point columns.
    pub fn column_count(&self) -> usize {
        self.column_count
    }

    /// Control points in row-major order.
    pub fn control_points(&self) -> &[DVec3] {
        &self.control_points
    }

    /// Material name.
    pub fn material(&self) -> &str {
        &self.material
    }

    /// Bounds of the control points.
    pub fn bounds(&self) -> Bounds3 {
        Bounds3::from_points(self.control_points.iter().copied()).unwrap_or(Bounds3::ZERO)
    }

    /// Transform every control point.
    pub fn transform(&mut self, transformation: &DMat4) {
        for p in &mut self.control_points {
            *p = transformation.transform_point3(*p);
        }
    }
}

/// Payload of a tree node.
#[derive(Clone, Debug, PartialEq)]
pub enum NodeKind {
    /// See [`World`].
    World(World),
    /// See [`Layer`].
    Layer(Layer),
    /// See [`Group`].
    Group(Group),
    /// See [`Entity`].
    Entity(Entity),
    /// See [`Brush`].
    Brush(Brush),
    /// See [`Patch`].
    Patch(Patch),
}

impl NodeKind {
    /// Type tag of the payload.
    pub fn node_type(&self) -> NodeType {
        match self {
            Self::World(_) => NodeType::World,
            Self::Layer(_) => NodeType::Layer,
            Self::Group(_) => NodeType::Group,
            Self::Entity(_) => NodeType::Entity,
            Self::Brush(_) => NodeType::Brush,
            Self::Patch(_) => NodeType::Patch,
        }
    }

    /// Display name: the world, layer, or group name, or the entity classname.
    pub fn name(&self) -> &str {
        match self {
            Self::World(world) => &world.name,
            Self::Layer(layer) => &layer.name,
            Self::Group(group) => group.name(),
            Self::Entity(entity) => entity.classname().unwrap_or(""),
            Self::Brush(_) => "brush",
            Self::Patch(_) => "patch",
        }
    }

    /// The group payload, if this is a group.
    pub fn as_group(&self) -> Option<&Group> {
        match self {
            Self::Group(group) => Some(group),
            _ => None,
        }
    }

    /// The entity payload, if this is an entity.
    pub fn as_entity(&self) -> Option<&Entity> {
        match self {
            Self::Entity(entity) => Some(entity),
            _ => None,
        }
    }

    /// The brush payload, if this is a brush.
    pub fn as_brush(&self) -> Option<&Brush> {
        match self {
            Self::Brush(brush) => Some(brush),
            _ => None,
        }
    }

    /// The patch payload, if this is a patch.
    pub fn as_patch(&self) -> Option<&Patch> {
        match self {
            Self::Patch(patch) => Some(patch),
            _ => None,
        }
    }

    /// Clone the payload as transferable contents; `None` for worlds and layers.
    pub fn to_contents(&self) -> Option<NodeContents> {
        match self {
            Self::World(_) | Self::Layer(_) => None,
            Self::Group(group) => Some(NodeContents::Group(group.clone())),
            Self::Entity(entity) => Some(NodeContents::Entity(entity.clone())),
            Self::Brush(brush) => Some(NodeContents::Brush(brush.clone())),
            Self::Patch(patch) => Some(NodeContents::Patch(patch.clone())),
        }
    }

    /// Convert into transferable contents; `None` for worlds and layers.
    pub fn into_contents(self) -> Option<NodeContents> {
        match self {
            Self::World(_) | Self::Layer(_) => None,
            Self::Group(group) => Some(NodeContents::Group(group)),
            Self::Entity(entity) => Some(NodeContents::Entity(entity)),
            Self::Brush(brush) => Some(NodeContents::Brush(brush)),
            Self::Patch(patch) => Some(NodeContents::Patch(patch)),
        }
    }

    /// Logical bounds given the union of the children's bounds.
    pub fn logical_bounds(&self, children: Option<Bounds3>) -> Bounds3 {
        match self {
            Self::World(_) | Self::Layer(_) | Self::Group(_) => children.unwrap_or(Bounds3::ZERO),
            Self::Entity(entity) => children.unwrap_or_else(|| entity.point_bounds()),
            Self::Brush(brush) => brush.bounds(),
            Self::Patch(patch) => patch.bounds(),
        }
    }
}

impl From<World> for NodeKind {
    fn from(world: World) -> Self {
        Self::World(world)
    }
}

impl From<Layer> for NodeKind {
    fn from(layer: Layer) -> Self {
        Self::Layer(layer)
    }
}

impl From<Group> for NodeKind {
    fn from(group: Group) -> Self {
        Self::Group(group)
    }
}

impl From<Entity> for NodeKind {
    fn from(entity: Entity) -> Self {
        Self::Entity(entity)
    }
}

impl From<Brush> for NodeKind {
    fn from(brush: Brush) -> Self {
        Self::Brush(brush)
    }
}

impl From<Patch> for NodeKind {
    fn from(patch: Patch) -> Self {
        Self::Patch(patch)
    }
}

impl From<NodeContents> for NodeKind {
    fn from(contents: NodeContents) -> Self {
        match contents {
            NodeContents::Group(group) => Self::Group(group),
            NodeContents::Entity(entity) => Self::Entity(entity),
            NodeContents::Brush(brush) => Self::Brush(brush),
            NodeContents::Patch(patch) => Self::Patch(patch),
        }
    }
}

/// Contents of a node that can live inside a group.
#[derive(Clone, Debug, PartialEq)]
pub enum NodeContents {
    /// See [`Group`].
    Group(Group),
    /// See [`Entity`].
    Entity(Entity),
    /// See [`Brush`].
    Brush(Brush),
    /// See [`Patch`].
    Patch(Patch),
}

impl NodeContents {
    /// Type tag of the contents.
    pub fn node_type(&self) -> NodeType {
        match self {
            Self::Group(_) => NodeType::Group,
            Self::Entity(_) => NodeType::Entity,
            Self::Brush(_) => NodeType::Brush,
            Self::Patch(_) => NodeType::Patch,
        }
    }

    /// The group, if these are group contents.
    pub fn as_group(&self) -> Option<&Group> {
        match self {
            Self::Group(group) => Some(group),
            _ => None,
        }
    }

    /// The group, mutably.
    pub fn as_group_mut(&mut self) -> Option<&mut Group> {
        match self {
            Self::Group(group) => Some(group),
            _ => None,
        }
    }

    /// The entity, if these are entity contents.
    pub fn as_entity(&self) -> Option<&Entity> {
        match self {
            Self::Entity(entity) => Some(entity),
            _ => None,
        }
    }

    /// The entity, mutably.
    pub fn as_entity_mut(&mut self) -> Option<&mut Entity> {
        match self {
            Self::Entity(entity) => Some(entity),
            _ => None,
        }
    }

    /// Apply `transformation`. Only brushes can fail.
    pub fn transform(
        &mut self,
        world_bounds: &Bounds3,
        transformation: &DMat4,
    ) -> Result<(), SceneError> {
        match self {
            Self::Group(group) => group.transform(transformation),
            Self::Entity(entity) => entity.transform(transformation),
            Self::Brush(brush) => brush.transform(world_bounds, transformation)?,
            Self::Patch(patch) => patch.transform(transformation),
        }
        Ok(())
    }

    /// Logical bounds given the union of the children's bounds.
    pub fn logical_bounds(&self, children: Option<Bounds3>) -> Bounds3 {
        match self {
            Self::Group(_) => children.unwrap_or(Bounds3::ZERO),
            Self::Entity(entity) => children.unwrap_or_else(|| entity.point_bounds()),
            Self::Brush(brush) => brush.bounds(),
            Self::Patch(patch) => patch.bounds(),
        }
    }
}

impl From<Group> for NodeContents {
    fn from(group: Group) -> Self {
        Self::Group(group)
    }
}

impl From<Entity> for NodeContents {
    fn from(entity: Entity) -> Self {
        Self::Entity(entity)
    }
}

impl From<Brush> for NodeContents {
    fn from(brush: Brush) -> Self {
        Self::Brush(brush)
    }
}

impl From<Patch> for NodeContents {
    fn from(patch: Patch) -> Self {
        Self::Patch(patch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::{string::ToString, vec};

    #[test]
    fn type_rules() {
        assert!(NodeType::World.accepts(NodeType::Layer));
        assert!(!NodeType::World.accepts(NodeType::Group));
        assert!(NodeType::Layer.accepts(NodeType::Patch));
        assert!(NodeType::Group.accepts(NodeType::Group));
        assert!(!NodeType::Group.accepts(NodeType::Layer));
        assert!(!NodeType::Group.accepts(NodeType::World));
        assert!(NodeType::Entity.accepts(NodeType::Brush));
        assert!(!NodeType::Entity.accepts(NodeType::Entity));
        assert!(!NodeType::Brush.accepts(NodeType::Brush));
        assert!(!NodeType::Patch.accepts(NodeType::Entity));
    }

    #[test]
    fn entity_origin_round_trips_through_property() {
        let mut entity = Entity::new();
        assert_eq!(entity.origin(), DVec3::ZERO);
        entity.transform(&DMat4::from_translation(DVec3::new(1.0, 0.0, 0.0)));
        assert_eq!(entity.property(ORIGIN_KEY), Some("1 0 0"));
        assert_eq!(entity.origin(), DVec3::new(1.0, 0.0, 0.0));

        entity.add_or_update_property(ORIGIN_KEY, "4 garbage");
        assert_eq!(entity.origin(), DVec3::new(4.0, 0.0, 0.0));
    }

    #[test]
    fn identity_transform_does_not_add_origin() {
        let mut entity =
            Entity::with_properties(vec![EntityProperty::new("some_key", "some_value")]);
        entity.transform(&DMat4::IDENTITY);
        assert_eq!(entity.properties().len(), 1);
        assert!(!entity.has_property(ORIGIN_KEY));
    }

    #[test]
    fn negative_zero_is_written_as_zero() {
        let mut entity = Entity::new();
        entity.set_origin(DVec3::new(-0.0, 2.5, -3.0));
        assert_eq!(entity.property(ORIGIN_KEY), Some("0 2.5 -3"));
    }

    #[test]
    fn property_order_is_preserved() {
        let mut entity = Entity::new();
        entity.add_or_update_property("a", "1");
        entity.add_or_update_property("b", "2");
        entity.add_or_update_property("a", "3");
        assert_eq!(
            entity.properties(),
            &[EntityProperty::new("a", "3"), EntityProperty::new("b", "2")]
        );
        assert_eq!(entity.remove_property("a"), Some("3".to_string()));
        assert_eq!(entity.remove_property("a"), None);
        assert_eq!(entity.properties(), &[EntityProperty::new("b", "2")]);
    }

    #[test]
    fn group_transform_premultiplies() {
        let mut group = Group::new("g");
        group.transform(&DMat4::from_translation(DVec3::X));
        group.transform(&DMat4::from_translation(DVec3::Y * 2.0));
        assert_eq!(
            group.transformation(),
            DMat4::from_translation(DVec3::new(1.0, 2.0, 0.0))
        );
    }

    #[test]
    fn group_joins_and_leaves_link_set() {
        let mut contents = NodeContents::from(Group::new("g"));
        assert_eq!(contents.as_group().unwrap().linked_group_id(), None);

        contents.as_group_mut().unwrap().set_linked_group_id("set");
        assert_eq!(contents.as_group().unwrap().linked_group_id(), Some("set"));
        assert!(contents.as_entity_mut().is_none());

        contents.as_group_mut().unwrap().reset_linked_group_id();
        assert_eq!(contents.as_group().unwrap().linked_group_id(), None);
    }

    #[test]
    fn brush_rejects_degenerate_and_out_of_world_transforms() {
        let world = Bounds3::DEFAULT_WORLD;
        let mut brush = Brush::cuboid(Bounds3::symmetric(32.0), "texture");
        let before = brush.clone();

        assert_eq!(
            brush.transform(&world, &DMat4::from_scale(DVec3::new(1.0, 0.0, 1.0))),
            Err(SceneError::DegenerateTransform)
        );
        assert_eq!(
            brush.transform(&world, &DMat4::from_translation(DVec3::X * 8192.0)),
            Err(SceneError::BrushOutOfWorld)
        );
        assert_eq!(brush, before, "failed transforms leave the brush untouched");

        brush
            .transform(&world, &DMat4::from_translation(DVec3::Z * 64.0))
            .unwrap();
        assert_eq!(
            brush.bounds(),
            Bounds3::new(DVec3::new(-32.0, -32.0, 32.0), DVec3::new(32.0, 32.0, 96.0))
        );
    }

    #[test]
    fn mirroring_reverses_winding() {
        let mut brush = Brush::cuboid(Bounds3::symmetric(16.0), "texture");
        let first_face = brush.faces()[0].indices().to_vec();
        brush
            .transform(
                &Bounds3::DEFAULT_WORLD,
                &DMat4::from_scale(DVec3::new(-1.0, 1.0, 1.0)),
            )
            .unwrap();
        let mut reversed = first_face.clone();
        reversed.reverse();
        assert_eq!(brush.faces()[0].indices(), reversed.as_slice());
    }

    #[test]
    fn brush_validation() {
        assert_eq!(Brush::new(vec![], vec![]), Err(SceneError::EmptyBrush));
        assert_eq!(
            Brush::new(
                vec![DVec3::ZERO, DVec3::X, DVec3::Y],
                vec![BrushFace::new(vec![0, 1, 3], "t")]
            ),
            Err(SceneError::InvalidBrushFace {
                index: 3,
                vertex_count: 3
            })
        );
    }

    #[test]
    fn patch_validation_and_transform() {
        assert!(Patch::new(2, 3, vec![DVec3::ZERO; 6], "t").is_err());
        assert!(Patch::new(3, 3, vec![DVec3::ZERO; 8], "t").is_err());

        let mut patch = Patch::new(3, 3, vec![DVec3::ONE; 9], "t").unwrap();
        patch.transform(&DMat4::from_translation(DVec3::X));
        assert_eq!(patch.control_points()[4], DVec3::new(2.0, 1.0, 1.0));
        assert_eq!(patch.bounds().min, DVec3::new(2.0, 1.0, 1.0));
    }

    #[test]
    fn composite_bounds_default_to_origin() {
        let group = NodeKind::Group(Group::new("g"));
        assert_eq!(group.logical_bounds(None), Bounds3::ZERO);
        let entity = NodeContents::Entity(Entity::new());
        assert_eq!(entity.logical_bounds(None), Bounds3::symmetric(8.0));
        let children = Bounds3::symmetric(1.0);
        assert_eq!(entity.logical_bounds(Some(children)), children);
    }
}
