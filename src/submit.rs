use std::io::Cursor;

use base64::{engine::general_purpose, Engine as _};
use image::{DynamicImage, ImageOutputFormat};
use tracing::info;

use crate::client::{GenerationRequest, InferenceClient, JobHandle};
use crate::error::Result;

/// Lossless PNG, base64 encoded for the JSON body.
pub fn encode_png_base64(img: &DynamicImage) -> Result<String> {
    let mut png_bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut png_bytes), ImageOutputFormat::Png)?;
    Ok(general_purpose::STANDARD.encode(&png_bytes))
}

/// Fires `count` independent jobs for the same image and prompt, in index order.
///
/// No retries: the first rejected submission is returned as the error.
pub async fn submit(
    client: &dyn InferenceClient,
    img: &DynamicImage,
    prompt: &str,
    count: usize,
) -> Result<Vec<JobHandle>> {
    let request = GenerationRequest::new(prompt, encode_png_base64(img)?);

    let mut handles = Vec::with_capacity(count);
    for index in 0..count {
        handles.push(client.submit(index, &request).await?);
    }

    info!(count, "submitted generation jobs");
    Ok(handles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedClient;
    use image::GenericImageView;
    use std::collections::HashSet;

    #[test]
    fn encoded_image_decodes_back_to_png() {
        let img = DynamicImage::new_rgb8(3, 2);
        let encoded = encode_png_base64(&img).unwrap();
        let bytes = general_purpose::STANDARD.decode(encoded).unwrap();
        assert_eq!(
            image::guess_format(&bytes).unwrap(),
            image::ImageFormat::Png
        );
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!(decoded.dimensions(), (3, 2));
    }

    #[tokio::test]
    async fn returns_one_distinct_pending_handle_per_job() {
        let client = ScriptedClient::new(vec![1, 1, 1, 1]);
        let img = DynamicImage::new_rgb8(4, 4);

        let handles = submit(&client, &img, "snow", 4).await.unwrap();

        assert_eq!(handles.len(), 4);
        let ids: HashSet<_> = handles.iter().map(|h| h.response_id.clone()).collect();
        assert_eq!(ids.len(), 4);
        assert_eq!(
            handles.iter().map(|h| h.index).collect::<Vec<_>>(),
            vec![0, 1, 2, 3]
        );
        assert!(client.ready_flags().iter().all(|ready| !ready));

        let requests = client.requests();
        assert_eq!(requests.len(), 4);
        assert!(requests.iter().all(|r| r.prompt == "snow" && r.batch == 1));
    }

    #[tokio::test]
    async fn submission_failure_stops_dispatch() {
        let client = ScriptedClient::new(vec![1, 1, 1]).fail_submit_at(1);
        let img = DynamicImage::new_rgb8(4, 4);

        let err = submit(&client, &img, "snow", 3).await.unwrap_err();

        assert_eq!(err.tier(), crate::error::ErrorTier::Client);
        assert_eq!(client.requests().len(), 1);
    }
}
