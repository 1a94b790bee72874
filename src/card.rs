use crate::drawable::Drawable;
use crate::types::Color;

/// The visual content of one card. Every field is optional; an absent field
/// reserves no space on the card.
#[derive(Debug, Clone, Default)]
pub struct CardRecord {
    color: Option<Color>,
    side_highlight: Option<Color>,
    title: Option<String>,
    icon: Option<Drawable>,
    card_type: Option<String>,
    top_image: Option<Drawable>,
    top_paragraph: Option<String>,
    bottom_paragraph: Option<String>,
    bottom_images: Option<Vec<Drawable>>,
}

impl CardRecord {
    pub fn builder() -> CardRecordBuilder {
        CardRecordBuilder::default()
    }

    pub fn color(&self) -> Option<Color> {
        self.color
    }

    pub fn side_highlight(&self) -> Option<Color> {
        self.side_highlight
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn icon(&self) -> Option<&Drawable> {
        self.icon.as_ref()
    }

    pub fn card_type(&self) -> Option<&str> {
        self.card_type.as_deref()
    }

    pub fn top_image(&self) -> Option<&Drawable> {
        self.top_image.as_ref()
    }

    pub fn top_paragraph(&self) -> Option<&str> {
        self.top_paragraph.as_deref()
    }

    pub fn bottom_paragraph(&self) -> Option<&str> {
        self.bottom_paragraph.as_deref()
    }

    pub fn bottom_images(&self) -> Option<&[Drawable]> {
        self.bottom_images.as_deref()
    }
}

#[derive(Debug, Default)]
pub struct CardRecordBuilder {
    record: CardRecord,
}

impl CardRecordBuilder {
    pub fn color(mut self, color: Color) -> Self {
        self.record.color = Some(color);
        self
    }

    pub fn side_highlight(mut self, color: Color) -> Self {
        self.record.side_highlight = Some(color);
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.record.title = Some(title.into());
        self
    }

    pub fn icon(mut self, icon: Drawable) -> Self {
        self.record.icon = Some(icon);
        self
    }

    pub fn card_type(mut self, card_type: impl Into<String>) -> Self {
        self.record.card_type = Some(card_type.into());
        self
    }

    pub fn top_image(mut self, image: Drawable) -> Self {
        self.record.top_image = Some(image);
        self
    }

    pub fn top_paragraph(mut self, text: impl Into<String>) -> Self {
        self.record.top_paragraph = Some(text.into());
        self
    }

    pub fn bottom_paragraph(mut self, text: impl Into<String>) -> Self {
        self.record.bottom_paragraph = Some(text.into());
        self
    }

    pub fn bottom_image(mut self, image: Drawable) -> Self {
        self.record
            .bottom_images
            .get_or_insert_with(Vec::new)
            .push(image);
        self
    }

    pub fn bottom_images(mut self, images: impl IntoIterator<Item = Drawable>) -> Self {
        self.record.bottom_images = Some(images.into_iter().collect());
        self
    }

    pub fn build(mut self) -> CardRecord {
        if self.record.bottom_images.as_ref().is_some_and(Vec::is_empty) {
            self.record.bottom_images = None;
        }
        self.record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drawable::ImageAsset;
    use crate::types::Size;
    use std::sync::Arc;

    #[test]
    fn empty_builder_yields_blank_record() {
        let record = CardRecord::builder().build();
        assert!(record.title().is_none());
        assert!(record.color().is_none());
        assert!(record.bottom_images().is_none());
    }

    #[test]
    fn empty_image_list_counts_as_absent() {
        let record = CardRecord::builder().bottom_images(Vec::new()).build();
        assert!(record.bottom_images().is_none());
    }

    #[test]
    fn bottom_images_keep_their_order() {
        let image = |name: &str| {
            Drawable::Image(Arc::new(ImageAsset::raster(name, Size::new(1.0, 1.0), name)))
        };
        let record = CardRecord::builder()
            .title("Pano")
            .bottom_image(image("a.png"))
            .bottom_image(image("b.png"))
            .build();
        let names: Vec<_> = record
            .bottom_images()
            .unwrap()
            .iter()
            .map(|d| match d {
                Drawable::Image(asset) => asset.name.clone(),
                Drawable::Painter(_) => String::new(),
            })
            .collect();
        assert_eq!(names, vec!["a.png", "b.png"]);
        assert_eq!(record.title(), Some("Pano"));
    }
}
