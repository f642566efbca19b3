//! Element trees
//!
//! An element tree composes rows into a document hierarchy: one root plus
//! nested containers of child elements, recursively. The tree is stored in
//! one contiguous vector; parent and child links are indices into that
//! vector, which keeps parent lookup O(1) without back-pointers.
//!
//! Serialized form, nodes in document order (parents before children):
//!
//! ```text
//! +--------------------+
//! | Node Count         | (u16 LE)
//! +--------------------+
//! | per node:          |
//! |   Parent Index     | (u16 LE, 0xFFFF for the root)
//! |   Container Id     | (u16 LE)
//! |   Row              | (u32 LE length prefix + row bytes)
//! +--------------------+
//! ```

use crate::row::{AppContext, BuildErrors, DecodeError, Row, RowResult};

/// Parent index marker for the root node
const NO_PARENT: u16 = u16::MAX;
/// Upper bound on nodes in one tree
pub const MAX_TREE_NODES: usize = (u16::MAX - 1) as usize;

/// One node of an element tree
#[derive(Debug, Clone, PartialEq)]
pub struct ElementNode {
    row: Row,
    parent: Option<usize>,
    container: String,
    children: Vec<usize>,
}

impl ElementNode {
    /// The node's row
    pub fn row(&self) -> &Row {
        &self.row
    }

    /// The node's row, mutably
    pub fn row_mut(&mut self) -> &mut Row {
        &mut self.row
    }

    /// Index of the parent node, `None` for the root
    pub fn parent(&self) -> Option<usize> {
        self.parent
    }

    /// Container this node lives in, empty for the root
    pub fn container(&self) -> &str {
        &self.container
    }

    /// Indices of the node's children, in insertion order
    pub fn children(&self) -> &[usize] {
        &self.children
    }
}

/// Arena-backed tree of rows
#[derive(Debug, Clone, PartialEq)]
pub struct ElementTree {
    nodes: Vec<ElementNode>,
}

impl ElementTree {
    /// Create a tree holding only the root row
    pub fn new(root: Row) -> Self {
        Self {
            nodes: vec![ElementNode {
                row: root,
                parent: None,
                container: String::new(),
                children: Vec::new(),
            }],
        }
    }

    /// Index of the root node
    pub const ROOT: usize = 0;

    /// The root node
    pub fn root(&self) -> &ElementNode {
        &self.nodes[Self::ROOT]
    }

    /// The root node, mutably
    pub fn root_mut(&mut self) -> &mut ElementNode {
        &mut self.nodes[Self::ROOT]
    }

    /// Append a child row under `parent` in the named container.
    ///
    /// Returns the new node's index. The row's container system field is
    /// set to the container name; panics if `parent` is out of range, as
    /// indices only come from this tree.
    pub fn add_child(&mut self, parent: usize, container: impl Into<String>, mut row: Row) -> usize {
        assert!(parent < self.nodes.len(), "parent index out of range");
        let container = container.into();
        row.set_container(container.clone());
        let idx = self.nodes.len();
        self.nodes.push(ElementNode {
            row,
            parent: Some(parent),
            container,
            children: Vec::new(),
        });
        self.nodes[parent].children.push(idx);
        idx
    }

    /// Node at an index
    pub fn node(&self, idx: usize) -> Option<&ElementNode> {
        self.nodes.get(idx)
    }

    /// Node at an index, mutably
    pub fn node_mut(&mut self, idx: usize) -> Option<&mut ElementNode> {
        self.nodes.get_mut(idx)
    }

    /// Number of nodes, root included
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// A tree always has its root
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Iterate nodes in document order
    pub fn iter(&self) -> impl Iterator<Item = (usize, &ElementNode)> {
        self.nodes.iter().enumerate()
    }

    /// Iterate nodes mutably in document order
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (usize, &mut ElementNode)> {
        self.nodes.iter_mut().enumerate()
    }

    /// Number of children of `idx` living in the named container
    pub fn child_count_in(&self, idx: usize, container: &str) -> usize {
        match self.nodes.get(idx) {
            Some(node) => node
                .children
                .iter()
                .filter(|&&c| self.nodes[c].container == container)
                .count(),
            None => 0,
        }
    }

    /// Build every node's row, joining all problems into one error
    pub fn build(&self) -> Result<(), BuildErrors> {
        let mut errs = BuildErrors::new();
        for node in &self.nodes {
            if let Err(e) = node.row.build() {
                errs.merge(e);
            }
        }
        errs.into_result()
    }

    /// Redact user field values on every node
    pub fn mask_values(&mut self) {
        for node in &mut self.nodes {
            node.row.mask_values();
        }
    }

    /// Release every node's row, recursively through nested values
    pub fn release(&mut self) {
        for node in &mut self.nodes {
            node.row.release();
        }
    }

    /// Encode the tree into `out`
    pub(crate) fn encode(&self, ctx: &dyn AppContext, out: &mut Vec<u8>) -> RowResult<()> {
        if self.nodes.len() > MAX_TREE_NODES {
            return Err(DecodeError::Corrupted(format!(
                "element tree has {} nodes, limit is {}",
                self.nodes.len(),
                MAX_TREE_NODES
            ))
            .into());
        }
        out.extend_from_slice(&(self.nodes.len() as u16).to_le_bytes());
        for node in &self.nodes {
            let parent = match node.parent {
                Some(p) => p as u16,
                None => NO_PARENT,
            };
            out.extend_from_slice(&parent.to_le_bytes());
            let cid = ctx.container_id(&node.container)?;
            out.extend_from_slice(&cid.to_le_bytes());

            let mut row_bytes = Vec::new();
            crate::row::encode_row(&node.row, ctx, &mut row_bytes)?;
            out.extend_from_slice(&(row_bytes.len() as u32).to_le_bytes());
            out.extend_from_slice(&row_bytes);
        }
        Ok(())
    }

    /// Decode a tree at the reader's position.
    ///
    /// Parents must precede children; anything else is corruption.
    pub(crate) fn decode(
        r: &mut crate::row::Reader<'_>,
        ctx: &dyn AppContext,
    ) -> RowResult<ElementTree> {
        let count = r.u16("element tree node count")? as usize;
        if count == 0 {
            return Err(DecodeError::Corrupted("element tree without a root".to_string()).into());
        }

        let mut nodes: Vec<ElementNode> = Vec::with_capacity(count);
        for idx in 0..count {
            let parent_raw = r.u16("element parent index")?;
            let parent = if parent_raw == NO_PARENT {
                None
            } else {
                let p = parent_raw as usize;
                if p >= idx {
                    return Err(DecodeError::Corrupted(format!(
                        "element {} references parent {} out of document order",
                        idx, p
                    ))
                    .into());
                }
                Some(p)
            };
            if parent.is_none() && idx != 0 {
                return Err(
                    DecodeError::Corrupted(format!("element {} has no parent", idx)).into(),
                );
            }

            let cid = r.u16("element container id")?;
            let container = ctx.container_by_id(cid)?;

            let row_bytes = r.len_prefixed("element row")?;
            let row = crate::row::load_row(row_bytes, ctx)?;

            nodes.push(ElementNode {
                row,
                parent,
                container,
                children: Vec::new(),
            });
            if let Some(p) = parent {
                let child = idx;
                nodes[p].children.push(child);
            }
        }
        Ok(ElementTree { nodes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::Row;
    use crate::schema::{ContainerDef, DataKind, FieldDef, Occurs, Schemas, TypeDef, TypeKind};
    use crate::names::QName;

    fn schemas() -> Schemas {
        let mut schemas = Schemas::new();
        schemas
            .add_type(
                TypeDef::new(QName::new("app", "order"), TypeKind::Object)
                    .with_field(FieldDef::required("number", DataKind::Int64))
                    .with_container(ContainerDef::new(
                        "lines",
                        QName::new("app", "line"),
                        1,
                        Occurs::Unbounded,
                    )),
            )
            .unwrap();
        schemas
            .add_type(
                TypeDef::new(QName::new("app", "line"), TypeKind::Element)
                    .with_field(FieldDef::required("qty", DataKind::Int32)),
            )
            .unwrap();
        schemas
    }

    fn new_row(ctx: &crate::row::testctx::TestCtx, name: &QName) -> Row {
        Row::new(ctx.layouts.get(name).unwrap())
    }

    #[test]
    fn test_tree_shape() {
        let schemas = schemas();
        let ctx = crate::row::testctx::TestCtx::new(&schemas);
        let mut root = new_row(&ctx, &QName::new("app", "order"));
        root.set_int64("number", 1);
        let mut tree = ElementTree::new(root);

        let mut line = new_row(&ctx, &QName::new("app", "line"));
        line.set_int32("qty", 5);
        let child = tree.add_child(ElementTree::ROOT, "lines", line);

        assert_eq!(tree.len(), 2);
        assert_eq!(tree.node(child).unwrap().parent(), Some(ElementTree::ROOT));
        assert_eq!(tree.node(child).unwrap().container(), "lines");
        assert_eq!(tree.child_count_in(ElementTree::ROOT, "lines"), 1);
        assert_eq!(tree.child_count_in(ElementTree::ROOT, "ghost"), 0);
        assert!(tree.build().is_ok());
    }

    #[test]
    fn test_build_joins_errors_across_nodes() {
        let schemas = schemas();
        let ctx = crate::row::testctx::TestCtx::new(&schemas);
        let root = new_row(&ctx, &QName::new("app", "order")); // missing "number"
        let mut tree = ElementTree::new(root);
        let line = new_row(&ctx, &QName::new("app", "line")); // missing "qty"
        tree.add_child(ElementTree::ROOT, "lines", line);

        let errs = tree.build().unwrap_err();
        assert_eq!(errs.len(), 2);
        let text = format!("{}", errs);
        assert!(text.contains("app.order"));
        assert!(text.contains("app.line"));
    }
}
