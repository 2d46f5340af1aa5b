//! Group touched addresses by owning file so each file is rendered once.

use indexmap::IndexSet;

use crate::core::position::SourceAddress;
use crate::parsers::go_parser::FileId;

/// Distinct owning files, in first-touch order.
pub fn group_by_file<'a, 'p: 'a, I>(addresses: I) -> IndexSet<FileId>
where
    I: IntoIterator<Item = &'a SourceAddress<'p>>,
{
    addresses.into_iter().map(|a| a.file).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::position::resolve_range;
    use crate::parsers::go_parser::Program;

    #[test]
    fn each_file_appears_once() {
        let program = Program::from_sources([
            ("a.go", "package p\n\nfunc a() { b(); b() }\n"),
            ("b.go", "package p\n\nfunc b() {}\n"),
        ])
        .unwrap();
        let (a, b) = (FileId(0), FileId(1));

        let addrs = vec![
            resolve_range(&program, a, 22, 22, false).unwrap(),
            resolve_range(&program, b, 16, 16, false).unwrap(),
            resolve_range(&program, a, 27, 27, false).unwrap(),
        ];

        let files: Vec<FileId> = group_by_file(&addrs).into_iter().collect();
        assert_eq!(files, vec![a, b]);
    }
}
