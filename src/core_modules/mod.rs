pub mod activation;
pub mod colour_space;
pub mod genetic_trainer;
pub mod genome;
pub mod gradient_trainer;
pub mod image;
pub mod pixel;
pub mod smart_pixel;
pub mod tied_network;
