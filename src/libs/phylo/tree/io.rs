use super::Tree;
use std::io::Read;

/// Serialize tree to Newick string.
pub fn to_newick(tree: &Tree) -> String {
    crate::libs::phylo::writer::write_newick(tree)
}

/// Read all trees from a Newick file ("stdin" for standard input).
pub fn from_file(infile: &str) -> anyhow::Result<Vec<Tree>> {
    let mut reader = intspan::reader(infile);
    let mut content = String::new();
    reader
        .read_to_string(&mut content)
        .map_err(|e| anyhow::anyhow!("Can't read [{}]: {}", infile, e))?;

    let trees = Tree::from_newick_multi(&content)?;
    Ok(trees)
}

/// Split raw Newick text into `;`-terminated blocks, one candidate tree per
/// block. Replicate files are one tree per line or several per line; a
/// trailing fragment without `;` is kept as its own (malformed) block so the
/// caller can report and skip it instead of silently merging it with the
/// next line.
pub fn split_blocks(content: &str) -> Vec<String> {
    let mut blocks = Vec::new();

    for line in content.lines() {
        let mut rest = line;
        while let Some(pos) = rest.find(';') {
            let (block, tail) = rest.split_at(pos + 1);
            if !block.trim().is_empty() {
                blocks.push(block.trim().to_string());
            }
            rest = tail;
        }
        if !rest.trim().is_empty() {
            blocks.push(rest.trim().to_string());
        }
    }

    blocks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_blocks() {
        let content = "(A,B);\n(A,(B,C)); (B,(A,C));\n\n((A,B)\n";
        let blocks = split_blocks(content);
        assert_eq!(
            blocks,
            vec!["(A,B);", "(A,(B,C));", "(B,(A,C));", "((A,B)"]
        );
    }

    #[test]
    fn test_split_blocks_parse() {
        let blocks = split_blocks("(A,B);\n((A,B)\n(C,D);\n");
        assert_eq!(blocks.len(), 3);
        assert!(Tree::from_newick(&blocks[0]).is_ok());
        assert!(Tree::from_newick(&blocks[1]).is_err());
        assert!(Tree::from_newick(&blocks[2]).is_ok());
    }
}
