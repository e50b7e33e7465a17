use shapeport_proto::{AttributeProto, TensorProto};

/// Read-only view over a node's attributes.
#[derive(Clone, Copy)]
pub(crate) struct Attrs<'a> {
    attrs: &'a [AttributeProto],
}

impl<'a> Attrs<'a> {
    pub(crate) fn new(attrs: &'a [AttributeProto]) -> Self {
        Self { attrs }
    }

    fn get(&self, name: &str) -> Option<&'a AttributeProto> {
        self.attrs.iter().find(|a| a.name == name)
    }

    pub(crate) fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub(crate) fn int(&self, name: &str) -> Option<i64> {
        self.get(name).map(|a| a.i)
    }

    pub(crate) fn int_or(&self, name: &str, default: i64) -> i64 {
        self.int(name).unwrap_or(default)
    }

    pub(crate) fn ints(&self, name: &str) -> Option<&'a [i64]> {
        self.get(name).map(|a| a.ints.as_slice())
    }

    pub(crate) fn float(&self, name: &str) -> Option<f32> {
        self.get(name).map(|a| a.f)
    }

    pub(crate) fn floats(&self, name: &str) -> Option<&'a [f32]> {
        self.get(name).map(|a| a.floats.as_slice())
    }

    pub(crate) fn string(&self, name: &str) -> Option<&'a str> {
        self.get(name).and_then(|a| std::str::from_utf8(&a.s).ok())
    }

    pub(crate) fn tensor(&self, name: &str) -> Option<&'a TensorProto> {
        self.get(name).and_then(|a| a.t.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shapeport_proto::onnx::attribute_proto::AttributeType;

    fn int_attr(name: &str, i: i64) -> AttributeProto {
        AttributeProto {
            name: name.to_string(),
            r#type: AttributeType::Int as i32,
            i,
            ..Default::default()
        }
    }

    #[test]
    fn reads_values_and_defaults() {
        let attrs = vec![
            int_attr("axis", -1),
            AttributeProto {
                name: "perm".to_string(),
                r#type: AttributeType::Ints as i32,
                ints: vec![0, 2, 1],
                ..Default::default()
            },
            AttributeProto {
                name: "auto_pad".to_string(),
                r#type: AttributeType::String as i32,
                s: "SAME_UPPER".into(),
                ..Default::default()
            },
        ];
        let view = Attrs::new(&attrs);
        assert_eq!(view.int("axis"), Some(-1));
        assert_eq!(view.int_or("keepdims", 1), 1);
        assert_eq!(view.ints("perm"), Some(&[0, 2, 1][..]));
        assert_eq!(view.string("auto_pad"), Some("SAME_UPPER"));
        assert!(!view.has("group"));
    }
}
