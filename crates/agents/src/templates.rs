//! Deterministic schema and component sources.
//!
//! Used whenever the LLM is unavailable or its answer cannot be used. The
//! output passes the reviewer and style checks unchanged.

use pipeline::BlockName;

use crate::detection::{component_name, display_title, kebab_name};

/// Generated sources for one block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockSources {
    pub schema: String,
    pub component: String,
}

/// Schema definition with a required `title` and an optional `subtitle`.
pub fn schema_template(block: &BlockName) -> String {
    let name = block.as_str();
    let title = display_title(block);
    format!(
        r#"import {{ defineField, defineType }} from 'sanity'

export const {name} = defineType({{
  name: '{name}',
  title: '{title}',
  type: 'object',
  fields: [
    defineField({{
      name: 'title',
      title: 'Title',
      type: 'string',
      validation: (Rule) => Rule.required(),
    }}),
    defineField({{
      name: 'subtitle',
      title: 'Subtitle',
      type: 'text',
    }}),
  ],
}})
"#
    )
}

/// Presentational component rendering the template schema's fields.
pub fn component_template(block: &BlockName) -> String {
    let component = component_name(block);
    let class = kebab_name(block);
    format!(
        r#"type {component}Props = {{
  title: string
  subtitle?: string
}}

export function {component}({{ title, subtitle }}: {component}Props) {{
  return (
    <section className="{class}">
      <h2 className="{class}__title">{{title}}</h2>
      {{subtitle ? <p className="{class}__subtitle">{{subtitle}}</p> : null}}
    </section>
  )
}}
"#
    )
}

pub fn block_template(block: &BlockName) -> BlockSources {
    BlockSources {
        schema: schema_template(block),
        component: component_template(block),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn templates_are_named_after_the_block() {
        let block = BlockName::new("countdownBlock").unwrap();
        let sources = block_template(&block);

        assert!(sources.schema.contains("export const countdownBlock = defineType({"));
        assert!(sources.schema.contains("name: 'countdownBlock',"));
        assert!(sources.schema.contains("title: 'Countdown Block',"));
        assert!(!sources.schema.contains("export default"));

        assert!(sources.component.contains("export function CountdownBlock("));
        assert!(sources.component.contains(r#"className="countdown-block""#));
        assert!(!sources.component.contains("style={{"));
    }
}
