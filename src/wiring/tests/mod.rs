mod phases;
