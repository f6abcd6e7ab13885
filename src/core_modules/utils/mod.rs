pub mod heatmap_image;
