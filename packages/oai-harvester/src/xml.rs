//! XML utility functions for navigating OAI-PMH response trees.

use roxmltree::Node;

/// Namespace of the OAI-PMH 2.0 response envelope.
pub const OAI_NS: &str = "http://www.openarchives.org/OAI/2.0/";

/// Namespace bound to the reserved `xml` prefix.
pub const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

/// Get the tag name without namespace prefix.
///
/// # Examples
/// ```
/// use roxmltree::Document;
/// use oai_harvester::xml::get_tag_name;
///
/// let xml = r#"<dc:title xmlns:dc="http://purl.org/dc/elements/1.1/">T</dc:title>"#;
/// let doc = Document::parse(xml).unwrap();
/// assert_eq!(get_tag_name(doc.root_element()), "title");
/// ```
pub fn get_tag_name<'a>(node: Node<'a, '_>) -> &'a str {
    node.tag_name().name()
}

/// Check if a node is an element in the OAI-PMH namespace with the given name.
pub fn is_oai(node: Node<'_, '_>, tag: &str) -> bool {
    node.is_element() && node.tag_name().namespace() == Some(OAI_NS) && get_tag_name(node) == tag
}

/// Find the first OAI-PMH child element with the given local name.
///
/// # Examples
/// ```
/// use roxmltree::Document;
/// use oai_harvester::xml::find_child;
///
/// let xml = r#"<record xmlns="http://www.openarchives.org/OAI/2.0/"><header/></record>"#;
/// let doc = Document::parse(xml).unwrap();
/// assert!(find_child(doc.root_element(), "header").is_some());
/// assert!(find_child(doc.root_element(), "metadata").is_none());
/// ```
pub fn find_child<'a, 'input>(node: Node<'a, 'input>, tag: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|child| is_oai(*child, tag))
}

/// Find all OAI-PMH child elements with the given local name.
pub fn find_children<'a, 'input>(
    node: Node<'a, 'input>,
    tag: &'a str,
) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children().filter(move |child| is_oai(*child, tag))
}

/// Get the text content of a node, trimmed.
pub fn get_text(node: Node<'_, '_>) -> String {
    node.text()
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

/// Get the trimmed text of the first OAI-PMH child with the given name.
///
/// Returns an empty string when the child is missing.
pub fn child_text(node: Node<'_, '_>, tag: &str) -> String {
    find_child(node, tag).map(get_text).unwrap_or_default()
}

/// Get all element children of a node.
pub fn element_children<'a, 'input>(
    node: Node<'a, 'input>,
) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children().filter(|child| child.is_element())
}

/// Check whether an element has no element children.
pub fn is_leaf(node: Node<'_, '_>) -> bool {
    node.is_element() && element_children(node).next().is_none()
}

/// Build the `prefix:local` name of an element.
///
/// The prefix is the one written on the element's own start tag, so a
/// namespace bound both as default and to a prefix keeps the prefix the
/// document used. Unprefixed elements yield just the local name.
///
/// # Examples
/// ```
/// use roxmltree::Document;
/// use oai_harvester::xml::qualified_name;
///
/// let xml = r#"<r xmlns:dc="http://purl.org/dc/elements/1.1/"><dc:title/><note/></r>"#;
/// let doc = Document::parse(xml).unwrap();
/// let names: Vec<_> = doc.root_element().children().filter(|n| n.is_element())
///     .map(qualified_name).collect();
/// assert_eq!(names, vec!["dc:title", "note"]);
/// ```
pub fn qualified_name(node: Node<'_, '_>) -> String {
    let local = get_tag_name(node);
    match element_prefix(node) {
        Some(prefix) => format!("{prefix}:{local}"),
        None => local.to_string(),
    }
}

/// The prefix of an element as written in its start tag.
///
/// roxmltree resolves namespaces but does not keep the prefix, so it is
/// read back from the source text.
fn element_prefix<'input>(node: Node<'_, 'input>) -> Option<&'input str> {
    let name = source_text(node).strip_prefix('<')?;
    let end = name.find(|c: char| matches!(c, ':' | '>' | '/') || c.is_whitespace())?;
    if name[end..].starts_with(':') && end > 0 {
        Some(&name[..end])
    } else {
        None
    }
}

/// Get the `xml:lang` attribute of an element.
pub fn xml_lang<'a>(node: Node<'a, '_>) -> Option<&'a str> {
    node.attribute((XML_NS, "lang"))
}

/// Get the original source text of a node.
pub fn source_text<'input>(node: Node<'_, 'input>) -> &'input str {
    &node.document().input_text()[node.range()]
}
