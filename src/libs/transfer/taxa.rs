use crate::libs::phylo::{Tree, TreeError};
use std::collections::HashMap;

/// Canonical taxon id, an index into the table's ordered name list.
pub type TaxonId = usize;

/// The canonical ordered list of taxon names for a run.
///
/// The reference tree fixes the table; every replicate is mapped against it
/// and rejected on any discrepancy. Names are kept sorted so ids do not
/// depend on the rotation of the input tree.
#[derive(Debug, Clone)]
pub struct TaxonTable {
    names: Vec<String>,
    ids: HashMap<String, TaxonId>,
}

impl TaxonTable {
    /// Build the table from the leaf names of a tree.
    pub fn from_tree(tree: &Tree) -> Result<Self, TreeError> {
        let mut names = Vec::new();
        for name in tree.get_leaf_names() {
            match name {
                Some(n) => names.push(n),
                None => {
                    return Err(TreeError::TaxonMismatch(
                        "leaf without a name".to_string(),
                    ))
                }
            }
        }
        names.sort();

        let mut ids = HashMap::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            if ids.insert(name.clone(), i).is_some() {
                return Err(TreeError::TaxonMismatch(format!(
                    "duplicated taxon [{}]",
                    name
                )));
            }
        }

        Ok(Self { names, ids })
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn id_of(&self, name: &str) -> Option<TaxonId> {
        self.ids.get(name).copied()
    }

    pub fn name_of(&self, id: TaxonId) -> &str {
        &self.names[id]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_from_tree() {
        let tree = Tree::from_newick("((E,B),(C,A),D);").unwrap();
        let table = TaxonTable::from_tree(&tree).unwrap();

        assert_eq!(table.len(), 5);
        // Sorted, independent of input rotation
        assert_eq!(table.id_of("A"), Some(0));
        assert_eq!(table.id_of("E"), Some(4));
        assert_eq!(table.name_of(2), "C");
        assert_eq!(table.id_of("F"), None);
    }

    #[test]
    fn test_table_rejects_duplicates() {
        let tree = Tree::from_newick("((A,B),(A,C));").unwrap();
        assert!(matches!(
            TaxonTable::from_tree(&tree),
            Err(TreeError::TaxonMismatch(_))
        ));
    }

    #[test]
    fn test_table_rejects_unnamed_leaves() {
        let tree = Tree::from_newick("((A,),B);").unwrap();
        assert!(TaxonTable::from_tree(&tree).is_err());
    }
}
