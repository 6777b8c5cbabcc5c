//! Incremental XML emission with retroactive changes to the open tag set.
//!
//! Speech sequences are linear: a command may reset an inner parameter
//! while an outer tag stays in force, which in XML requires closing and
//! reopening tags around the transition. The writer tracks the *desired*
//! tag set separately from the tags currently open in the output; when
//! the desired set changes, [`XmlWriter::flush_tags`] closes every open
//! tag and reopens the desired ones, so the emitted document is balanced
//! without ever computing a common ancestor.

use indexmap::IndexMap;

/// Tags the writer can hold open around text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    /// SSML document root.
    Speak,
    /// Voice selection (carries `xml:lang`).
    Voice,
    /// Prosody parameters (pitch, rate, volume).
    Prosody,
    /// Text interpretation hint (character mode).
    SayAs,
    /// Explicit phonemic pronunciation.
    Phoneme,
}

impl Tag {
    /// Tag name as it appears in the output.
    pub fn name(self) -> &'static str {
        match self {
            Self::Speak => "speak",
            Self::Voice => "voice",
            Self::Prosody => "prosody",
            Self::SayAs => "say-as",
            Self::Phoneme => "phoneme",
        }
    }
}

/// Attribute map for one tag. Insertion order is preserved in the output.
pub type AttrMap = IndexMap<&'static str, String>;

/// Balanced-tag XML emitter.
pub struct XmlWriter {
    out: String,
    /// Tags opened once at document start, closed only by [`Self::finish`].
    enclosing_all: Vec<Tag>,
    /// Tags currently open in the output (excluding `enclosing_all`).
    open_tags: Vec<Tag>,
    /// The desired current tag set and attributes.
    tags: IndexMap<Tag, AttrMap>,
    /// Whether `tags` has diverged from `open_tags`.
    tags_changed: bool,
    /// A tag wrapped around each individual text run while set.
    tag_enclosing_text: Option<(Tag, AttrMap)>,
}

impl XmlWriter {
    pub fn new() -> Self {
        Self {
            out: String::new(),
            enclosing_all: Vec::new(),
            open_tags: Vec::new(),
            tags: IndexMap::new(),
            tags_changed: false,
            tag_enclosing_text: None,
        }
    }

    /// Append raw, unescaped output.
    pub fn raw(&mut self, text: &str) {
        self.out.push_str(text);
    }

    /// Append text, XML-escaped. If a text-enclosing tag is set, the run
    /// is wrapped in a matching open/close pair.
    pub fn text(&mut self, text: &str) {
        let enclosing = self.tag_enclosing_text.clone();
        if let Some((tag, attrs)) = &enclosing {
            self.open_tag(*tag, attrs);
        }
        let escaped = escape_text(text);
        self.out.push_str(&escaped);
        if let Some((tag, _)) = &enclosing {
            self.close_tag(*tag);
        }
    }

    /// Open a tag that encloses the entire document. Must be called before
    /// any other emission.
    pub fn enclose_all(&mut self, tag: Tag, attrs: &AttrMap) {
        self.open_tag(tag, attrs);
        self.enclosing_all.push(tag);
    }

    /// Set an attribute on a desired tag, adding the tag if needed. The
    /// change takes effect at the next [`Self::flush_tags`].
    pub fn set_attr(&mut self, tag: Tag, attr: &'static str, value: impl Into<String>) {
        let value = value.into();
        let attrs = self.tags.entry(tag).or_default();
        if attrs.get(attr) != Some(&value) {
            attrs.insert(attr, value);
            self.tags_changed = true;
        }
    }

    /// Remove an attribute from a desired tag; the tag itself is dropped
    /// once its attribute map empties.
    pub fn del_attr(&mut self, tag: Tag, attr: &str) {
        let Some(attrs) = self.tags.get_mut(&tag) else {
            return;
        };
        if attrs.shift_remove(attr).is_none() {
            return;
        }
        if attrs.is_empty() {
            self.tags.shift_remove(&tag);
        }
        self.tags_changed = true;
    }

    /// Wrap every subsequent text run in `tag` until
    /// [`Self::stop_enclosing_text`] is called.
    pub fn enclose_text_in_tag(&mut self, tag: Tag, attrs: AttrMap) {
        self.tag_enclosing_text = Some((tag, attrs));
    }

    /// Stop wrapping text runs.
    pub fn stop_enclosing_text(&mut self) {
        self.tag_enclosing_text = None;
    }

    /// Reconcile the output with the desired tag set: close every open
    /// tag in reverse order, then reopen the desired set.
    pub fn flush_tags(&mut self) {
        if !self.tags_changed {
            return;
        }
        for tag in self.open_tags.clone().into_iter().rev() {
            self.close_tag(tag);
        }
        self.open_tags.clear();
        for (tag, attrs) in self.tags.clone() {
            self.open_tag(tag, &attrs);
            self.open_tags.push(tag);
        }
        self.tags_changed = false;
    }

    /// Close all remaining tags and return the finished document.
    pub fn finish(mut self) -> String {
        for tag in self.open_tags.clone().into_iter().rev() {
            self.close_tag(tag);
        }
        for tag in self.enclosing_all.clone().into_iter().rev() {
            self.close_tag(tag);
        }
        self.out
    }

    /// Emit an open tag with attributes directly.
    pub fn open_tag(&mut self, tag: Tag, attrs: &AttrMap) {
        self.out.push('<');
        self.out.push_str(tag.name());
        for (attr, value) in attrs {
            self.out.push(' ');
            self.out.push_str(attr);
            self.out.push_str("=\"");
            self.out.push_str(&escape_attr(value));
            self.out.push('"');
        }
        self.out.push('>');
    }

    /// Emit a close tag directly.
    pub fn close_tag(&mut self, tag: Tag) {
        self.out.push_str("</");
        self.out.push_str(tag.name());
        self.out.push('>');
    }
}

impl Default for XmlWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Escape text content: `<`, `>`, `&`.
pub fn escape_text(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '&' => escaped.push_str("&amp;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Escape an attribute value: text escapes plus the quote character.
pub fn escape_attr(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '&' => escaped.push_str("&amp;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
